pub mod export;

pub use export::CsvExport;
