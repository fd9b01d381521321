//! Property tests: no input, however adversarial, canonicalizes to a location
//! outside the storage root.

use std::path::{Component, Path, PathBuf};

use proptest::prelude::*;
use vstash_path::{canonicalize, to_absolute};

/// Pieces that show up in traversal attempts.
fn segment() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("..".to_string()),
        Just(".".to_string()),
        Just(String::new()),
        Just("...".to_string()),
        Just("..hidden".to_string()),
        Just("C:".to_string()),
        Just("%2e%2e".to_string()),
        Just("etc".to_string()),
        Just("passwd".to_string()),
        "[a-z]{1,8}",
    ]
}

fn separator() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("/"), Just("\\"), Just("//"), Just("/./")]
}

fn adversarial_path() -> impl Strategy<Value = String> {
    (
        prop::option::of(separator()),
        prop::collection::vec((segment(), separator()), 0..8),
        segment(),
    )
        .prop_map(|(lead, parts, last)| {
            let mut s = lead.unwrap_or("").to_string();
            for (seg, sep) in parts {
                s.push_str(&seg);
                s.push_str(sep);
            }
            s.push_str(&last);
            s
        })
}

/// Lexical normalization, the way the OS would walk the components.
fn lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for c in path.components() {
        match c {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

proptest! {
    #[test]
    fn canonical_paths_stay_under_root(raw in adversarial_path()) {
        let root = Path::new("/srv/storage");
        if let Ok(canonical) = canonicalize(&raw) {
            let abs = to_absolute(&canonical, root);
            prop_assert!(lexical(&abs).starts_with(root), "{raw:?} -> {abs:?}");
            prop_assert!(!canonical.as_str().starts_with('/'));
            prop_assert!(canonical.segments().all(|s| s != ".." && s != "." && !s.is_empty()));
        }
    }

    #[test]
    fn any_parent_segment_is_rejected(raw in adversarial_path()) {
        let has_parent = raw.split(['/', '\\']).any(|s| s == "..");
        prop_assert_eq!(canonicalize(&raw).is_err(), has_parent);
    }

    #[test]
    fn canonicalize_is_idempotent(raw in adversarial_path()) {
        if let Ok(once) = canonicalize(&raw) {
            let twice = canonicalize(once.as_str()).unwrap();
            prop_assert_eq!(once, twice);
        }
    }

    #[test]
    fn arbitrary_strings_never_escape(raw in "\\PC{0,40}") {
        let root = Path::new("/srv/storage");
        if let Ok(canonical) = canonicalize(&raw) {
            prop_assert!(lexical(&to_absolute(&canonical, root)).starts_with(root));
        }
    }
}
