//! End-to-end coverage of local paths flowing through the capability layer:
//! a `DevicePath` with no device prefix must behave like the underlying
//! filesystem for every operation.

use std::fs;
use std::path::Path;

use devicefs_core::{DevicePath, FileFilter, IterationControl};

fn device(path: &Path) -> DevicePath {
    DevicePath::local(path.to_string_lossy().into_owned())
}

#[test]
fn write_read_and_stat_through_path_values() {
    let dir = tempfile::tempdir().unwrap();
    let file = device(&dir.path().join("document.qml"));

    assert!(!file.exists().unwrap());
    file.write_file_contents(b"import QtQuick\n").unwrap();
    assert!(file.is_file().unwrap());
    assert_eq!(file.file_contents(None, 0).unwrap(), b"import QtQuick\n");
    assert_eq!(file.file_size().unwrap(), 15);

    let info = file.file_path_info().unwrap();
    assert_eq!(info.file_size, 15);
    assert!(info.modified_secs > 0);
}

#[test]
fn ensure_writable_directory_creates_missing_trees() {
    let dir = tempfile::tempdir().unwrap();
    let nested = device(&dir.path().join("a/b/c"));

    nested.ensure_writable_directory().unwrap();
    assert!(nested.is_directory().unwrap());

    // A second call on the now-existing directory is a no-op.
    nested.ensure_writable_directory().unwrap();

    // A file in the way is an error, not a silent success.
    let blocked = device(&dir.path().join("file"));
    blocked.write_file_contents(b"x").unwrap();
    assert!(blocked.ensure_writable_directory().is_err());
}

#[test]
fn rename_and_copy_between_local_paths() {
    let dir = tempfile::tempdir().unwrap();
    let original = device(&dir.path().join("one"));
    let renamed = device(&dir.path().join("two"));
    let copied = device(&dir.path().join("three"));

    original.write_file_contents(b"payload").unwrap();
    original.rename_file(&renamed).unwrap();
    assert!(!original.exists().unwrap());

    renamed.copy_file(&copied).unwrap();
    assert_eq!(copied.file_contents(None, 0).unwrap(), b"payload");
    assert_eq!(renamed.file_contents(None, 0).unwrap(), b"payload");
}

#[test]
fn recursive_copy_replicates_a_tree() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    fs::create_dir_all(src.join("imports/MyModule")).unwrap();
    fs::write(src.join("Main.qml"), b"root").unwrap();
    fs::write(src.join("imports/MyModule/Thing.qml"), b"leaf").unwrap();

    let target = device(&dir.path().join("backup"));
    device(&src).copy_recursively(&target).unwrap();

    assert_eq!(
        fs::read(dir.path().join("backup/Main.qml")).unwrap(),
        b"root"
    );
    assert_eq!(
        fs::read(dir.path().join("backup/imports/MyModule/Thing.qml")).unwrap(),
        b"leaf"
    );
}

#[test]
fn dir_entries_collects_matching_paths() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.qml"), b"x").unwrap();
    fs::write(dir.path().join("b.qml"), b"x").unwrap();
    fs::write(dir.path().join("c.txt"), b"x").unwrap();

    let filter = FileFilter::new().with_patterns(["*.qml"]);
    let mut names: Vec<String> = device(dir.path())
        .dir_entries(&filter)
        .unwrap()
        .iter()
        .map(|p| p.file_name().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["a.qml", "b.qml"]);
}

#[test]
fn recursive_iteration_sees_nested_entries() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("x/y")).unwrap();
    fs::write(dir.path().join("x/y/deep.qml"), b"x").unwrap();

    let mut filter = FileFilter::new().with_patterns(["*.qml"]);
    filter.recursive = true;
    let mut found = false;
    device(dir.path())
        .iterate_directory(&filter, &mut |entry, _| {
            found = entry.file_name() == "deep.qml";
            if found {
                IterationControl::Stop
            } else {
                IterationControl::Continue
            }
        })
        .unwrap();
    assert!(found);
}

#[test]
fn parent_navigation_matches_the_real_tree() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("project/scenes")).unwrap();
    let file = device(&dir.path().join("project/scenes/main.qml"));
    file.write_file_contents(b"x").unwrap();

    let scenes = file.parent_directory();
    assert!(scenes.is_directory().unwrap());
    assert_eq!(scenes.file_name(), "scenes");
    assert!(file.is_child_of(&scenes));

    let rel = file.relative_child_path(&device(dir.path())).unwrap();
    assert_eq!(rel.path(), "project/scenes/main.qml");
}

#[test]
fn temp_dir_from_template_is_created_under_its_parent() {
    let dir = tempfile::tempdir().unwrap();
    let template = device(&dir.path().join("session.XXXXXX"));
    let created = template.create_temp_dir().unwrap();
    assert!(created.is_directory().unwrap());
    assert!(created.is_child_of(&device(dir.path())));
}

#[cfg(unix)]
#[test]
fn symlinks_are_created_and_resolved() {
    let dir = tempfile::tempdir().unwrap();
    let target = device(&dir.path().join("real.qml"));
    let link = device(&dir.path().join("alias.qml"));
    target.write_file_contents(b"x").unwrap();

    target.create_symlink(&link).unwrap();
    assert!(link.is_symlink().unwrap());
    assert!(link.is_file().unwrap(), "stat follows the link");
    assert_eq!(link.sym_link_target().unwrap(), target);
}

#[cfg(unix)]
#[test]
fn executable_resolution_requires_the_exec_bit() {
    use devicefs_core::Permissions;

    let dir = tempfile::tempdir().unwrap();
    let tool = device(&dir.path().join("qmlpuppet"));
    tool.write_file_contents(b"#!/bin/sh\n").unwrap();

    tool.set_permissions(Permissions::from_unix_mode(0o644))
        .unwrap();
    assert!(!tool.is_executable_file().unwrap());
    assert_eq!(tool.refers_to_executable_file().unwrap(), None);

    tool.set_permissions(Permissions::from_unix_mode(0o755))
        .unwrap();
    assert!(tool.is_executable_file().unwrap());
    assert_eq!(tool.refers_to_executable_file().unwrap(), Some(tool.clone()));
}

#[cfg(unix)]
#[test]
fn ownership_queries_answer_for_the_current_user() {
    let dir = tempfile::tempdir().unwrap();
    let file = device(&dir.path().join("f"));
    file.write_file_contents(b"x").unwrap();
    assert!(!file.owner().unwrap().is_empty());
    assert!(!file.group().unwrap().is_empty());
}

#[test]
fn free_space_is_reported_for_existing_paths() {
    let dir = tempfile::tempdir().unwrap();
    assert!(device(dir.path()).bytes_available().unwrap() > 0);
}

#[test]
fn environment_of_the_local_device_is_the_process_environment() {
    std::env::set_var("DEVICEFS_TEST_MARKER", "present");
    let env = device(Path::new("/")).device_environment().unwrap();
    assert!(env.contains(&("DEVICEFS_TEST_MARKER".to_string(), "present".to_string())));
}
