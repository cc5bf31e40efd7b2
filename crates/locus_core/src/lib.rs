//! The `locus_core` crate is a numeric zero-locus extraction engine for
//! complex-valued symbolic expressions over declared parameter domains.
//!
//! Key components:
//! - **Parameter space**: axis/range/resolution declarations plus fixed
//!   parameters, validated eagerly ([`param_space`]).
//! - **Equation engine**: expression parser, substitution, and a bytecode VM
//!   evaluating in the complex plane ([`equation_engine`]).
//! - **Planar extractor**: marching squares contours of a chosen scalar
//!   component on a 2D grid ([`contour`]).
//! - **Volumetric extractor**: dual marching-cubes isosurfaces (real = 0 and
//!   imag = 0) intersected into the space curve where a complex function
//!   vanishes ([`locus`], [`isosurface`], [`intersection`]).

pub mod contour;
pub mod equation_engine;
pub mod error;
mod geometry;
pub mod grid;
pub mod intersection;
pub mod isosurface;
pub mod locus;
pub mod param_space;
pub mod render;
