pub mod common;

pub use common::{DataArgs, FigureArgs, ModelArgs};
