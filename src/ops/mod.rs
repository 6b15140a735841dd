pub mod adjustments;
pub mod compare;
pub mod segment;
pub mod shapes;
pub mod text;
pub mod transform;
