//! Built-in controller models.
//!
//! A model is data: a [`ControllerDescription`] naming GATT locators
//! plus codec functions for the model's byte layouts. The registry
//! registers the built-ins at [`init`] with lowest priority, so
//! application-supplied descriptions always win selection.
//!
//! [`ControllerDescription`]: crate::matcher::ControllerDescription
//! [`init`]: crate::registry::ControllerRegistry::init

pub mod hogp;
pub mod xbox;
