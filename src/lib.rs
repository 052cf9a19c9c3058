//! Terminal choropleth dashboard of monument counts per municipality.
//!
//! Data flows one way: [`data`] loads the municipalities and the category
//! mapping, [`metric`] aggregates a category, [`scale`] buckets the result,
//! and [`map`] / [`export`] draw it. [`app`] and [`ui`] wire the three user
//! selections to a full recomputation.

pub mod app;
pub mod braille;
pub mod config;
pub mod data;
pub mod export;
pub mod map;
pub mod metric;
pub mod palette;
pub mod scale;
pub mod ui;
