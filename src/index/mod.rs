// SPDX-License-Identifier: GPL-3.0-only
pub mod catalog;
pub mod error;
pub mod format;
pub mod marshal;
pub mod resolver;

pub use catalog::{CatalogEntry, PackageId, RemoteCatalog};
pub use error::IndexError;
pub use format::{decode_index, IndexEncoding};
pub use resolver::IndexResolver;
