//! Graph storage: the on-disk CSR format, its readers, and the compact
//! local graph the partitioner produces.

pub mod buffered;
pub mod csr;
pub mod file;
pub mod offline;

pub use buffered::BufferedGraph;
pub use csr::{EdgeInstaller, LocalCsr};
pub use file::write_graph_file;
pub use offline::OfflineGraph;
