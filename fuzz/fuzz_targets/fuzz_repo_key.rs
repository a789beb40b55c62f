//! Fuzz target for `owner/name` key parsing.
//!
//! Keys come from the CLI, the registry document and ledger rows.

#![no_main]

use libfuzzer_sys::fuzz_target;
use message_mirror::target::{parse_repo_key, RepositoryTarget};

fuzz_target!(|key: &str| {
    if let Ok((owner, name)) = parse_repo_key(key) {
        assert!(!owner.is_empty());
        assert!(!name.contains('/'));

        let target = RepositoryTarget::new(owner, name);
        // A parsed key always names a target whose paths stay under its storage dir.
        let path = target.message_path(1);
        assert!(path.starts_with(target.storage_dir()));
    }
});
