//! Variables module for reqflow
//!
//! This module provides the layered variable store, `$NAME` substitution into
//! request templates and the capture engine that feeds response values back
//! into the store.

pub mod capture;
pub mod extract;
pub mod store;
pub mod substitution;

pub use capture::{
    apply_captures, BodyExpr, CaptureError, CaptureFailure, CaptureReport, CaptureSource,
    CaptureSpec, OnMissing,
};
pub use store::{normalize_env_name, Scope, VarSnapshot, VarStore, DEFAULT_ENV};
pub use substitution::{
    referenced_variables, render_request, substitute, validate_prefix, validate_template,
    RenderError, RequestPart, SubstitutionOptions, UnresolvedPolicy, VarError,
    DEFAULT_VAR_PREFIX,
};
