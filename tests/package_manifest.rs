use treesync::{Package, TreePath, UpdateOperations};

fn strings(paths: &[TreePath]) -> Vec<String> {
    paths.iter().map(|p| p.to_string()).collect()
}

fn assert_no_ops_except(ops: &UpdateOperations, allowed: &[&str]) {
    let categories = [
        ("deletes", ops.deletes.is_empty()),
        ("rmdirs", ops.rmdirs.is_empty()),
        ("mkdirs", ops.mkdirs.is_empty()),
        ("downloads", ops.downloads.is_empty()),
        ("mklinks", ops.mklinks.is_empty()),
        ("executable_fixes", ops.executable_fixes.is_empty()),
    ];
    for (name, empty) in categories {
        if !allowed.contains(&name) {
            assert!(empty, "expected no {} in {:?}", name, ops);
        }
    }
}

const DEEP_DIR: &str = r#"
{
    "files": {
        "a/b/c/d/e": {
            "type": "directory"
        }
    }
}
"#;

const EMPTY_FILE: &str = r#"
{
    "files": {
        "a/b/c/d/file": {
            "type": "file",
            "downloads": {
                "raw": {
                    "url": "http://dethware.org/empty.txt",
                    "sha1": "da39a3ee5e6b4b0d3255bfef95601890afd80709",
                    "size": 0
                }
            },
            "executable": false
        }
    }
}
"#;

const SPACE_FILE: &str = r#"
{
    "files": {
        "a/b/c/d/file": {
            "type": "file",
            "downloads": {
                "raw": {
                    "url": "http://dethware.org/space.txt",
                    "sha1": "dd122581c8cd44d0227f9c305581ffcb4b6f1b46",
                    "size": 1
                }
            },
            "executable": false
        }
    }
}
"#;

const DIR_ONLY: &str = r#"
{
    "files": {
        "a/b/c/d": {
            "type": "directory"
        }
    }
}
"#;

fn parse(json: &str) -> Package {
    let p = Package::from_manifest_contents(json.as_bytes());
    assert!(p.valid, "manifest should parse: {json}");
    p
}

#[test]
fn test_mkdir_deep() {
    let ops = UpdateOperations::resolve(&Package::default(), &parse(DEEP_DIR));
    assert!(ops.valid);
    assert_eq!(
        strings(&ops.mkdirs),
        [".", "a", "a/b", "a/b/c", "a/b/c/d", "a/b/c/d/e"]
    );
    assert_no_ops_except(&ops, &["mkdirs"]);
}

#[test]
fn test_rmdir_deep() {
    let ops = UpdateOperations::resolve(&parse(DEEP_DIR), &Package::default());
    assert!(ops.valid);
    assert_eq!(
        strings(&ops.rmdirs),
        ["a/b/c/d/e", "a/b/c/d", "a/b/c", "a/b", "a", "."]
    );
    assert_no_ops_except(&ops, &["rmdirs"]);
}

#[test]
fn test_identical_file() {
    let manifest = r#"
{
    "files": {
        "a/b/c/d/empty.txt": {
            "type": "file",
            "downloads": {
                "raw": {
                    "url": "http://dethware.org/empty.txt",
                    "sha1": "da39a3ee5e6b4b0d3255bfef95601890afd80709",
                    "size": 0
                }
            },
            "executable": false
        }
    }
}
"#;
    let ops = UpdateOperations::resolve(&parse(manifest), &parse(manifest));
    assert!(ops.valid);
    assert!(ops.is_empty());
}

#[test]
fn test_changed_file() {
    let ops = UpdateOperations::resolve(&parse(EMPTY_FILE), &parse(SPACE_FILE));
    assert_eq!(strings(&ops.deletes), ["a/b/c/d/file"]);
    assert_eq!(ops.downloads.len(), 1);
    let download = &ops.downloads[&TreePath::new("a/b/c/d/file")];
    assert_eq!(download.source.hash, "dd122581c8cd44d0227f9c305581ffcb4b6f1b46");
    assert_eq!(download.source.url, "http://dethware.org/space.txt");
    assert_eq!(download.source.size, 1);
    assert_no_ops_except(&ops, &["deletes", "downloads"]);
}

#[test]
fn test_added_file() {
    let ops = UpdateOperations::resolve(&parse(DIR_ONLY), &parse(SPACE_FILE));
    assert_eq!(ops.downloads.len(), 1);
    assert_eq!(
        ops.downloads[&TreePath::new("a/b/c/d/file")].source.url,
        "http://dethware.org/space.txt"
    );
    assert_no_ops_except(&ops, &["downloads"]);
}

#[test]
fn test_removed_file() {
    let ops = UpdateOperations::resolve(&parse(SPACE_FILE), &parse(DIR_ONLY));
    assert_eq!(strings(&ops.deletes), ["a/b/c/d/file"]);
    assert_no_ops_except(&ops, &["deletes"]);
}

#[test]
fn test_new_paths_only_appear_in_downloads() {
    let from = parse(DIR_ONLY);
    let to = parse(SPACE_FILE);
    let forward = UpdateOperations::resolve(&from, &to);
    let backward = UpdateOperations::resolve(&to, &from);

    let downloaded: Vec<&TreePath> = forward.downloads.keys().collect();
    let deleted: Vec<&TreePath> = backward.deletes.iter().collect();
    assert_eq!(downloaded, deleted);
    assert!(forward.deletes.is_empty());
}

#[test]
fn test_invalid_side_propagates() {
    let broken = Package::from_manifest_contents(br#"{ "files": { "x": { "type": "fifo" } } }"#);
    assert!(!broken.valid);

    for ops in [
        UpdateOperations::resolve(&broken, &parse(SPACE_FILE)),
        UpdateOperations::resolve(&parse(SPACE_FILE), &broken),
    ] {
        assert!(!ops.valid);
        assert!(ops.is_empty());
    }
}

#[test]
fn test_directory_ordering_invariant() {
    let wide = r#"{ "files": {
        "z/y/x": { "type": "directory" },
        "a/b": { "type": "directory" },
        "m": { "type": "directory" },
        "a/c/d/e": { "type": "directory" } } }"#;
    let mkdirs = UpdateOperations::resolve(&Package::default(), &parse(wide)).mkdirs;
    for (i, dir) in mkdirs.iter().enumerate() {
        for later in &mkdirs[i + 1..] {
            assert!(
                later.depth() >= dir.depth(),
                "{later} comes after {dir} but is shallower"
            );
        }
    }

    let rmdirs = UpdateOperations::resolve(&parse(wide), &Package::default()).rmdirs;
    for (i, dir) in rmdirs.iter().enumerate() {
        for later in &rmdirs[i + 1..] {
            assert!(later.depth() <= dir.depth());
        }
    }
    assert_eq!(mkdirs.len(), rmdirs.len());
}

#[test]
fn test_path_normalization() {
    assert_eq!(TreePath::new("a/./b//c"), TreePath::new("a/b/c"));
    assert_eq!(TreePath::new("a/b/../c"), TreePath::new("a/c"));
}
