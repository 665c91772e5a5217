// Catalog-facing types shared by the validation core and its adapters

pub mod content;

pub use content::*;
