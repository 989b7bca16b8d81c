//! Network admittance model and the weighted-least-squares solver.

pub mod wls;
pub mod ybus;
