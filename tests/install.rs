// tests/install.rs

//! End-to-end tests of the file-install processor.

use instill::dao::LocDao;
use instill::{
    CollectingReporter, ConfigTree, Error, Event, FileInstaller, InstallOptions,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const MD5_HELLO: &str = "5d41402abc4b2a76b9719d911017c592";
const SHA256_HELLO: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

/// Run the installer over `config_text` with targets under `root`.
fn run(config_text: &str, root: &Path) -> (Result<(), Error>, CollectingReporter) {
    let config = ConfigTree::parse(config_text).unwrap();
    let reporter = CollectingReporter::new();
    let result = {
        let installer = FileInstaller::new(
            &config,
            &reporter,
            InstallOptions {
                root: Some(root.to_path_buf()),
                ..Default::default()
            },
        );
        installer.process()
    };
    (result, reporter)
}

fn count_unchanged(reporter: &CollectingReporter) -> usize {
    reporter
        .events()
        .iter()
        .filter(|event| matches!(event, Event::FileUnchanged { .. }))
        .count()
}

#[test]
fn end_to_end_single_source() {
    let sources = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let bar = sources.path().join("bar.txt");
    fs::write(&bar, b"hello").unwrap();

    let config_text = format!("[file:foo]\nsource={}\n", bar.display());
    let (result, _reporter) = run(&config_text, root.path());
    result.unwrap();

    assert_eq!(fs::read_to_string(root.path().join("foo")).unwrap(), "hello");

    // The database records both the target and its source, and the
    // target's blob checksum is the md5 of its content.
    let mut dao = LocDao::new(root.path());
    let foo = dao.select("foo").unwrap().expect("target recorded");
    assert_eq!(foo.paths.len(), 1);
    assert_eq!(foo.paths[0].checksum.as_deref(), Some(MD5_HELLO));
    assert_eq!(foo.dep_names, [bar.to_string_lossy().into_owned()]);

    let source = dao
        .select(bar.to_string_lossy().as_ref())
        .unwrap()
        .expect("source recorded");
    assert_eq!(source.scheme.as_deref(), Some("fs"));
    assert_eq!(source.paths[0].checksum.as_deref(), Some(MD5_HELLO));
}

#[test]
fn second_run_is_idempotent() {
    let sources = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let bar = sources.path().join("bar.txt");
    fs::write(&bar, b"hello").unwrap();
    let config_text = format!("[file:foo]\nsource={}\n", bar.display());

    let (result, reporter) = run(&config_text, root.path());
    result.unwrap();
    assert_eq!(count_unchanged(&reporter), 0);

    let db_bytes_before = fs::read(root.path().join(".instill-file.db")).unwrap();
    let (result, reporter) = run(&config_text, root.path());
    result.unwrap();
    assert_eq!(count_unchanged(&reporter), 1);
    let db_bytes_after = fs::read(root.path().join(".instill-file.db")).unwrap();
    assert_eq!(db_bytes_before, db_bytes_after);
}

#[test]
fn source_change_propagates_to_target() {
    let sources = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let bar = sources.path().join("bar.txt");
    fs::write(&bar, b"hello").unwrap();
    let config_text = format!("[file:foo]\nsource={}\n", bar.display());

    run(&config_text, root.path()).0.unwrap();
    assert_eq!(fs::read_to_string(root.path().join("foo")).unwrap(), "hello");

    // The target itself is untouched; only the source changes.
    fs::write(&bar, b"world").unwrap();
    let (result, reporter) = run(&config_text, root.path());
    result.unwrap();
    assert_eq!(count_unchanged(&reporter), 0);
    assert_eq!(fs::read_to_string(root.path().join("foo")).unwrap(), "world");
}

#[test]
fn target_edit_triggers_rebuild() {
    let sources = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let bar = sources.path().join("bar.txt");
    fs::write(&bar, b"hello").unwrap();
    let config_text = format!("[file:foo]\nsource={}\n", bar.display());

    run(&config_text, root.path()).0.unwrap();
    fs::write(root.path().join("foo"), b"tampered").unwrap();

    run(&config_text, root.path()).0.unwrap();
    assert_eq!(fs::read_to_string(root.path().join("foo")).unwrap(), "hello");
}

#[test]
fn blob_sources_concatenate_in_declared_order() {
    let sources = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let a = sources.path().join("a.txt");
    let b = sources.path().join("b.txt");
    fs::write(&a, b"AAA").unwrap();
    fs::write(&b, b"BBB").unwrap();

    let config_text = format!("[file:out]\nsource={} {}\n", a.display(), b.display());
    run(&config_text, root.path()).0.unwrap();
    assert_eq!(fs::read_to_string(root.path().join("out")).unwrap(), "AAABBB");

    // Reversed declaration reverses the bytes.
    let root2 = TempDir::new().unwrap();
    let config_text = format!("[file:out]\nsource={} {}\n", b.display(), a.display());
    run(&config_text, root2.path()).0.unwrap();
    assert_eq!(fs::read_to_string(root2.path().join("out")).unwrap(), "BBBAAA");
}

#[test]
fn reordered_sources_rebuild_existing_target() {
    let sources = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let a = sources.path().join("a.txt");
    let b = sources.path().join("b.txt");
    fs::write(&a, b"AAA").unwrap();
    fs::write(&b, b"BBB").unwrap();

    let forward = format!("[file:out]\nsource={} {}\n", a.display(), b.display());
    run(&forward, root.path()).0.unwrap();

    let reversed = format!("[file:out]\nsource={} {}\n", b.display(), a.display());
    let (result, reporter) = run(&reversed, root.path());
    result.unwrap();
    assert_eq!(count_unchanged(&reporter), 0);
    assert_eq!(fs::read_to_string(root.path().join("out")).unwrap(), "BBBAAA");
}

#[test]
fn optional_missing_source_is_skipped_with_event() {
    let sources = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let a = sources.path().join("a.txt");
    fs::write(&a, b"kept").unwrap();

    let config_text = format!(
        "[file:out]\nsource={} ({}/absent.txt)\n",
        a.display(),
        sources.path().display()
    );
    let (result, reporter) = run(&config_text, root.path());
    result.unwrap();

    assert_eq!(fs::read_to_string(root.path().join("out")).unwrap(), "kept");
    assert!(reporter.events().iter().any(|event| matches!(
        event,
        Event::SourceSkipped { target, .. } if target == "out"
    )));
}

#[test]
fn mandatory_missing_source_fails_naming_target() {
    let sources = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();

    let config_text = format!(
        "[file:out]\nsource={}/absent.txt\n",
        sources.path().display()
    );
    let (result, _reporter) = run(&config_text, root.path());
    match result.unwrap_err() {
        Error::ConfigProcess(err) => {
            assert_eq!(err.keys, ["file:out", "source"]);
        }
        other => panic!("expected config error, got {other:?}"),
    }
    assert!(!root.path().join("out").exists());
}

#[test]
fn bad_mode_fails_before_any_source_resolution() {
    let root = TempDir::new().unwrap();
    // The source does not exist; if resolution ran it would fail with an
    // unresolved-source error, so seeing the mode error proves resolution
    // was never reached.
    let config_text = "[file:out]\nmode=bogus\nsource=/definitely/not/here\n";
    let (result, _reporter) = run(config_text, root.path());
    match result.unwrap_err() {
        Error::ConfigProcess(err) => {
            assert_eq!(err.keys, ["file:out", "mode"]);
            assert_eq!(err.value.as_deref(), Some("bogus"));
        }
        other => panic!("expected config error, got {other:?}"),
    }
    assert!(!root.path().join("out").exists());
}

#[test]
fn declared_checksum_verifies_and_mismatch_fails() {
    let sources = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let bar = sources.path().join("bar.txt");
    fs::write(&bar, b"hello").unwrap();

    let ok = format!(
        "[file:foo]\nsource={}\nchecksum={}\n",
        bar.display(),
        MD5_HELLO
    );
    run(&ok, root.path()).0.unwrap();

    let bad = format!(
        "[file:foo2]\nsource={}\nchecksum=00000000000000000000000000000000\n",
        bar.display()
    );
    let (result, _reporter) = run(&bad, root.path());
    match result.unwrap_err() {
        Error::ConfigProcess(err) => {
            assert_eq!(err.keys, ["file:foo2", "checksum"]);
            let cause = err.cause.expect("mismatch cause").to_string();
            assert!(cause.contains(MD5_HELLO), "cause: {cause}");
        }
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn checksum_algorithm_is_reguessed_from_length() {
    let sources = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let bar = sources.path().join("bar.txt");
    fs::write(&bar, b"hello").unwrap();

    // Declared as sha256 while the default record algorithm is md5: the
    // verifier re-guesses the algorithm from the digest length.
    let config_text = format!(
        "[file:foo]\nsource={}\nchecksum={}\n",
        bar.display(),
        SHA256_HELLO
    );
    run(&config_text, root.path()).0.unwrap();
}

#[test]
fn mkdir_and_symlink_targets() {
    let root = TempDir::new().unwrap();
    let dest = root.path().join("releases/v2");
    fs::create_dir_all(&dest).unwrap();

    let config_text = format!(
        "[file:data]\nmode=mkdir\n[file:current]\nmode=symlink\nsource={}\n",
        dest.display()
    );
    run(&config_text, root.path()).0.unwrap();

    assert!(root.path().join("data").is_dir());
    let link = root.path().join("current");
    assert_eq!(fs::read_link(&link).unwrap(), dest);

    // Second run: both targets are already in shape.
    let (result, reporter) = run(&config_text, root.path());
    result.unwrap();
    assert_eq!(count_unchanged(&reporter), 2);
}

#[test]
fn symlink_plus_requires_existing_destination() {
    let root = TempDir::new().unwrap();
    let config_text = "[file:current]\nmode=symlink+\nsource=/no/such/destination\n";
    let (result, _reporter) = run(config_text, root.path());
    match result.unwrap_err() {
        Error::ConfigProcess(err) => {
            assert_eq!(err.keys, ["file:current", "source"]);
        }
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn zero_source_target_is_empty_file() {
    let root = TempDir::new().unwrap();
    let (result, _reporter) = run("[file:empty]\n", root.path());
    result.unwrap();
    let path = root.path().join("empty");
    assert!(path.is_file());
    assert_eq!(fs::read(&path).unwrap(), b"");
}

#[test]
fn content_is_accepted_as_source_alias() {
    let sources = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let bar = sources.path().join("bar.txt");
    fs::write(&bar, b"hello").unwrap();

    let config_text = format!("[file:foo]\ncontent={}\n", bar.display());
    run(&config_text, root.path()).0.unwrap();
    assert_eq!(fs::read_to_string(root.path().join("foo")).unwrap(), "hello");
}

#[test]
fn namelist_source_builds_target() {
    let root = TempDir::new().unwrap();
    let config_text = "[file:run.nl]\nsource=namelist:run\n\
                       [namelist:run]\nsteps=10\nverbose=.true.\n";
    run(config_text, root.path()).0.unwrap();
    assert_eq!(
        fs::read_to_string(root.path().join("run.nl")).unwrap(),
        "&run\nsteps=10,\nverbose=.true.,\n/\n"
    );
}

#[test]
fn tree_target_syncs_directory_sources() {
    if instill::exec::Runner::new().which("rsync").is_none() {
        // Tree builds shell out to rsync.
        return;
    }
    let sources = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let tree = sources.path().join("tree");
    fs::create_dir_all(tree.join("sub")).unwrap();
    fs::write(tree.join("a.txt"), b"a").unwrap();
    fs::write(tree.join("sub/b.txt"), b"b").unwrap();

    let config_text = format!("[file:data]\nsource={}\n", tree.display());
    run(&config_text, root.path()).0.unwrap();

    assert_eq!(
        fs::read_to_string(root.path().join("data/a.txt")).unwrap(),
        "a"
    );
    assert_eq!(
        fs::read_to_string(root.path().join("data/sub/b.txt")).unwrap(),
        "b"
    );

    let (result, reporter) = run(&config_text, root.path());
    result.unwrap();
    assert_eq!(count_unchanged(&reporter), 1);
}

#[test]
fn ignored_sections_are_not_processed() {
    let root = TempDir::new().unwrap();
    let config_text = "[!file:dead]\nsource=/no/such/source\n";
    let (result, _reporter) = run(config_text, root.path());
    result.unwrap();
    assert!(!root.path().join("dead").exists());
}

#[test]
fn glob_sources_expand_in_sorted_order() {
    let sources = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    fs::write(sources.path().join("part-1.txt"), b"one,").unwrap();
    fs::write(sources.path().join("part-2.txt"), b"two").unwrap();

    let config_text = format!(
        "[file:joined]\nsource={}/part-*.txt\n",
        sources.path().display()
    );
    run(&config_text, root.path()).0.unwrap();
    assert_eq!(
        fs::read_to_string(root.path().join("joined")).unwrap(),
        "one,two"
    );
}

#[test]
fn file_install_root_setting_is_honored() {
    let sources = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    let bar = sources.path().join("bar.txt");
    fs::write(&bar, b"hello").unwrap();
    let install_root = workspace.path().join("run1");

    let config_text = format!(
        "file-install-root={}\n[file:foo]\nsource={}\n",
        install_root.display(),
        bar.display()
    );
    // No explicit root option: the setting decides.
    let config = ConfigTree::parse(&config_text).unwrap();
    let reporter = CollectingReporter::new();
    let installer = FileInstaller::new(&config, &reporter, InstallOptions::default());
    installer.process().unwrap();

    assert_eq!(
        fs::read_to_string(install_root.join("foo")).unwrap(),
        "hello"
    );
    assert!(install_root.join(".instill-file.db").exists());
}

#[test]
fn only_filter_limits_processing() {
    let sources = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let bar = sources.path().join("bar.txt");
    fs::write(&bar, b"hello").unwrap();

    let config_text = format!(
        "[file:wanted]\nsource={}\n[file:unwanted]\nsource=/no/such/source\n",
        bar.display()
    );
    let config = ConfigTree::parse(&config_text).unwrap();
    let reporter = CollectingReporter::new();
    let installer = FileInstaller::new(
        &config,
        &reporter,
        InstallOptions {
            root: Some(root.path().to_path_buf()),
            only: vec!["wanted".to_string()],
            ..Default::default()
        },
    );
    installer.process().unwrap();

    assert!(root.path().join("wanted").is_file());
    assert!(!root.path().join("unwanted").exists());

    // Asking for an undeclared target is a config error.
    let installer = FileInstaller::new(
        &config,
        &reporter,
        InstallOptions {
            root: Some(root.path().to_path_buf()),
            only: vec!["ghost".to_string()],
            ..Default::default()
        },
    );
    assert!(matches!(
        installer.process().unwrap_err(),
        Error::ConfigProcess(_)
    ));
}

#[test]
fn no_overwrite_mode_refuses_existing_targets() {
    let sources = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let bar = sources.path().join("bar.txt");
    fs::write(&bar, b"hello").unwrap();
    fs::write(root.path().join("foo"), b"pre-existing").unwrap();

    let config_text = format!("[file:foo]\nsource={}\n", bar.display());
    let config = ConfigTree::parse(&config_text).unwrap();
    let reporter = CollectingReporter::new();
    let installer = FileInstaller::new(
        &config,
        &reporter,
        InstallOptions {
            root: Some(root.path().to_path_buf()),
            no_overwrite: true,
            ..Default::default()
        },
    );
    assert!(matches!(
        installer.process().unwrap_err(),
        Error::ConfigProcess(_)
    ));
    assert_eq!(
        fs::read_to_string(root.path().join("foo")).unwrap(),
        "pre-existing"
    );
}

#[test]
fn nested_targets_build_into_subdirectories() {
    let sources = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let bar = sources.path().join("bar.txt");
    fs::write(&bar, b"hello").unwrap();

    let config_text = format!(
        "[file:etc/deep/nest/foo]\nsource={}\n",
        bar.display()
    );
    run(&config_text, root.path()).0.unwrap();
    assert_eq!(
        fs::read_to_string(root.path().join("etc/deep/nest/foo")).unwrap(),
        "hello"
    );
}
