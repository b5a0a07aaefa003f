// -- Lint policy ---------------------------------------------------------
// This is the single source of truth for crate-wide lints.

// Broad lint groups
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
// Documentation
#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::bare_urls)]
// No panicking in library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
// No debug/print artifacts
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
// Import hygiene
#![deny(clippy::wildcard_imports)]
// Function signature hygiene
#![deny(clippy::fn_params_excessive_bools)]
// Clone / pass-by-value hygiene
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::implicit_clone)]
// String hygiene
#![deny(clippy::inefficient_to_string)]
#![deny(clippy::redundant_closure_for_method_calls)]
#![deny(clippy::manual_string_new)]
#![deny(clippy::str_to_string)]
// Cargo lints (warn, not deny since cargo lints can be noisy)
#![warn(clippy::cargo)]
// Unused / redundant code
#![warn(unused_results)]
#![warn(unused_qualifications)]
// Cast hygiene
#![warn(trivial_casts)]
#![warn(trivial_numeric_casts)]
// Test modules glob-import their parent and unwrap freely.
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::wildcard_imports,
        clippy::float_cmp,
        clippy::cast_precision_loss
    )
)]

//! GPU particle simulation and rendering engine built on wgpu.
//!
//! Nebula keeps particles in named GPU buffers, updates them with compute
//! programs and draws them as instanced meshes. Buffers bind to shader
//! blocks by name, so a program only sees the buffers it declares.
//!
//! # Key entry points
//!
//! - [`engine::Engine`] - the top-level context owning device, programs,
//!   meshes, materials and particle systems
//! - [`particle::ParticleSystem`] - particle buffers plus ordered compute
//!   [`particle::Action`]s and render hooks
//! - [`gpu::GpuDevice`] - the binding-model device, implemented by
//!   [`gpu::WgpuDevice`] and the host-memory [`gpu::HeadlessDevice`]
//! - [`options::EngineOptions`] - runtime configuration
//!
//! # Frame
//!
//! A driver calls [`engine::Engine::update_all`], which runs every action
//! of every system: bind program and buffers, `pre_update` hooks,
//! dispatch, barrier, `post_update` hooks. It then calls
//! [`engine::Engine::draw_all`], which draws one mesh instance per
//! particle between `pre_render` and `post_render` hooks. Hooks run inline
//! and may change device state, provided they restore it.

pub mod engine;
pub mod error;
pub mod gpu;
pub mod options;
pub mod particle;
pub mod program;
pub mod resources;
pub mod signal;
pub mod systems;
pub mod util;

pub use engine::Engine;
pub use error::EngineError;
pub use options::EngineOptions;
