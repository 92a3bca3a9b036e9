//! End-of-run report artifacts

pub mod html;

pub use html::ReportSynthesizer;
