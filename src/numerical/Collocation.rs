/// Polynomial algebra over coefficient lists (evaluate, multiply, derivative, antiderivative)
pub mod Collocation_poly;
/// Collocation node grids and the continuity/differentiation/quadrature coefficient sets
pub mod Collocation_coeffs;
/// Main collocation object: DAE callable contracts, forward step assembler, state buffers
pub mod Collocation_main;
/// Adjoint (backward-time) step assembler, the algebraic transpose of the forward relation
pub mod Collocation_backward;
/// Versioned save/restore of assembled step relations
pub mod Collocation_io;
