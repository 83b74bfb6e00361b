//! nested-todos: a personal hierarchical to-do list.
//!
//! The pure core is [`validation`] (raw form input to typed payloads) and
//! [`forest`] (flat todo list to a filtered tree). [`db`] and [`api`] serve
//! it over HTTP; [`client`] and [`render`] back the `ntd` command line.

pub mod api;
pub mod client;
pub mod db;
pub mod forest;
pub mod models;
pub mod render;
pub mod validation;
