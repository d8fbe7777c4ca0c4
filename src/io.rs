/// Dataset persistence: JSON rows and CSV summaries.
pub mod export;
