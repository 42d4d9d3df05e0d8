//! File-system adapters for the reqflow capabilities.

pub mod discovery;
pub mod exporter;
pub mod parser;
pub mod store;

pub use discovery::DirectoryDiscovery;
pub use exporter::FileExporter;
pub use parser::FileDocumentParser;
pub use store::JsonWorkspaceStore;
