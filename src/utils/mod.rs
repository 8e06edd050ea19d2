// SPDX-License-Identifier: GPL-3.0-only
pub mod atomic_file;
pub mod path_sanitizer;
pub mod url_validator;

pub use atomic_file::{is_part_file, stage_copy, write_atomic, PartFile};
pub use path_sanitizer::{validate_artifact_name, validate_relative_path, UnsafeName};
pub use url_validator::{join_url, validate_source_url};
