//! The shell backend run against real Unix tools on the local machine: the
//! command compositions must agree with what the desktop backend reports
//! for the same tree.

#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use devicefs_core::access::KindFilter;
use devicefs_core::{
    CommandOutput, CommandRunner, DesktopFileAccess, DeviceFileAccess, DevicePath, FileFilter,
    FsResult, IterationControl, LocalCommandRunner, OsKind, Permissions, ShellDeviceFileAccess,
};

fn shell() -> ShellDeviceFileAccess {
    ShellDeviceFileAccess::new(Arc::new(LocalCommandRunner::new()), OsKind::host())
}

fn device(path: &Path) -> DevicePath {
    DevicePath::local(path.to_string_lossy().into_owned())
}

/// Delegates to the real runner but pretends `find` is missing, forcing the
/// `ls` fallback strategy.
struct NoFindRunner(LocalCommandRunner);

impl CommandRunner for NoFindRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&[u8]>,
    ) -> FsResult<CommandOutput> {
        if program == "find" {
            return Ok(CommandOutput {
                exit_code: Some(127),
                stdout: Vec::new(),
                stderr: b"sh: find: not found\n".to_vec(),
            });
        }
        self.0.run(program, args, stdin)
    }
}

#[test]
fn predicates_agree_with_the_desktop_backend() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("present.txt");
    fs::write(&file, b"x").unwrap();

    let shell = shell();
    let desktop = DesktopFileAccess::new();
    for candidate in [
        device(&file),
        device(dir.path()),
        device(&dir.path().join("missing")),
    ] {
        assert_eq!(
            shell.exists(&candidate).unwrap(),
            desktop.exists(&candidate).unwrap(),
            "{candidate}"
        );
        assert_eq!(
            shell.is_file(&candidate).unwrap(),
            desktop.is_file(&candidate).unwrap(),
            "{candidate}"
        );
        assert_eq!(
            shell.is_directory(&candidate).unwrap(),
            desktop.is_directory(&candidate).unwrap(),
            "{candidate}"
        );
    }
}

#[test]
fn dd_round_trip_with_offset_and_limit() {
    let dir = tempfile::tempdir().unwrap();
    let file = device(&dir.path().join("data.bin"));
    let shell = shell();

    assert_eq!(
        shell
            .write_file_contents(&file, b"0123456789abcdef")
            .unwrap(),
        16
    );
    assert_eq!(
        shell.file_contents(&file, None, 0).unwrap(),
        b"0123456789abcdef"
    );
    assert_eq!(shell.file_contents(&file, Some(4), 8).unwrap(), b"89ab");
    assert_eq!(shell.file_contents(&file, None, 12).unwrap(), b"cdef");
    assert_eq!(shell.file_contents(&file, Some(0), 0).unwrap(), b"");
}

#[test]
fn writes_replace_longer_previous_contents() {
    let dir = tempfile::tempdir().unwrap();
    let file = device(&dir.path().join("f"));
    let shell = shell();
    shell
        .write_file_contents(&file, b"a much longer first version")
        .unwrap();
    shell.write_file_contents(&file, b"short").unwrap();
    assert_eq!(shell.file_contents(&file, None, 0).unwrap(), b"short");
}

#[test]
fn stat_info_matches_std_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("f");
    fs::write(&file, b"12345").unwrap();

    let info = shell().file_path_info(&device(&file)).unwrap();
    let meta = fs::metadata(&file).unwrap();
    assert_eq!(info.file_size, meta.len());
    assert_eq!(
        u64::from(info.permissions.to_unix_mode()),
        u64::from(std::os::unix::fs::MetadataExt::mode(&meta) & 0o777)
    );
}

#[test]
fn chmod_round_trips_through_stat() {
    let dir = tempfile::tempdir().unwrap();
    let file = device(&dir.path().join("f"));
    let shell = shell();
    shell.write_file_contents(&file, b"x").unwrap();

    let wanted = Permissions::from_unix_mode(0o640);
    shell.set_permissions(&file, wanted).unwrap();
    assert_eq!(shell.permissions(&file).unwrap(), wanted);
    assert!(shell.is_readable_file(&file).unwrap());
    assert!(!shell.is_executable_file(&file).unwrap());
}

#[test]
fn directory_lifecycle_through_shell_commands() {
    let dir = tempfile::tempdir().unwrap();
    let shell = shell();

    let project = device(&dir.path().join("project/nested"));
    shell.create_directory(&project).unwrap();
    assert!(shell.is_directory(&project).unwrap());

    let marker = device(&dir.path().join("project/nested/marker"));
    shell.ensure_existing_file(&marker).unwrap();
    assert!(shell.is_file(&marker).unwrap());

    shell.remove_file(&marker).unwrap();
    assert!(!shell.exists(&marker).unwrap());

    // Tempdirs live under /tmp, deep enough for the removal guard.
    let victim = device(&dir.path().join("project"));
    shell.remove_recursively(&victim).unwrap();
    assert!(!shell.exists(&victim).unwrap());
}

#[test]
fn recursive_copy_merges_into_the_target() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    fs::create_dir_all(src.join("inner")).unwrap();
    fs::write(src.join("a.txt"), b"1").unwrap();
    fs::write(src.join("inner/b.txt"), b"2").unwrap();

    let shell = shell();
    let target = device(&dir.path().join("dst"));
    shell.copy_recursively(&device(&src), &target).unwrap();

    assert_eq!(fs::read(dir.path().join("dst/a.txt")).unwrap(), b"1");
    assert_eq!(fs::read(dir.path().join("dst/inner/b.txt")).unwrap(), b"2");
}

#[test]
fn symlink_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let target = device(&dir.path().join("real"));
    let link = device(&dir.path().join("alias"));
    let shell = shell();

    shell.write_file_contents(&target, b"x").unwrap();
    shell.create_symlink(&target, &link).unwrap();
    assert!(shell.is_symlink(&link).unwrap());
    assert_eq!(shell.sym_link_target(&link).unwrap(), target);
}

#[test]
fn hard_links_share_a_file_id() {
    let dir = tempfile::tempdir().unwrap();
    let original = dir.path().join("one");
    let alias = dir.path().join("two");
    fs::write(&original, b"x").unwrap();
    fs::hard_link(&original, &alias).unwrap();

    let shell = shell();
    assert!(shell
        .is_same_file(&device(&original), &device(&alias))
        .unwrap());
    assert!(!shell
        .is_same_file(&device(&original), &device(dir.path()))
        .unwrap());
}

fn collect(access: &dyn DeviceFileAccess, root: &DevicePath, filter: &FileFilter) -> Vec<String> {
    let mut seen = Vec::new();
    access
        .iterate_directory(root, filter, &mut |entry, _| {
            seen.push(entry.path().to_string());
            IterationControl::Continue
        })
        .unwrap();
    seen.sort();
    seen
}

#[test]
fn find_and_ls_strategies_list_the_same_tree() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
    fs::write(dir.path().join("top.qml"), b"x").unwrap();
    fs::write(dir.path().join("sub/mid.qml"), b"x").unwrap();
    fs::write(dir.path().join("sub/deeper/leaf.txt"), b"x").unwrap();

    let with_find = shell();
    let without_find =
        ShellDeviceFileAccess::new(Arc::new(NoFindRunner(LocalCommandRunner::new())), OsKind::host());

    let mut filter = FileFilter::new();
    filter.recursive = true;
    let root = device(dir.path());
    assert_eq!(
        collect(&with_find, &root, &filter),
        collect(&without_find, &root, &filter)
    );

    // Pattern and kind filtering must agree between the strategies too.
    let mut qml_files = FileFilter::new().with_patterns(["*.qml"]);
    qml_files.recursive = true;
    qml_files.kind = KindFilter::FilesOnly;
    assert_eq!(
        collect(&with_find, &root, &qml_files),
        collect(&without_find, &root, &qml_files)
    );
}

#[test]
fn find_strategy_reports_metadata_when_requested() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("file.txt"), b"12345").unwrap();

    let mut filter = FileFilter::new();
    filter.with_info = true;
    let mut sizes = Vec::new();
    shell()
        .iterate_directory(&device(dir.path()), &filter, &mut |entry, info| {
            let info = info.expect("info requested");
            sizes.push((entry.file_name().to_string(), info.file_size));
            IterationControl::Continue
        })
        .unwrap();
    assert_eq!(sizes, vec![("file.txt".to_string(), 5)]);
}

#[test]
fn names_with_spaces_survive_the_stat_line_format() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("my scene file.qml"), b"x").unwrap();

    let mut filter = FileFilter::new();
    filter.with_info = true;
    let mut names = Vec::new();
    shell()
        .iterate_directory(&device(dir.path()), &filter, &mut |entry, _| {
            names.push(entry.file_name().to_string());
            IterationControl::Continue
        })
        .unwrap();
    assert_eq!(names, vec!["my scene file.qml"]);
}

#[test]
fn temp_files_on_the_device_are_unique() {
    let dir = tempfile::tempdir().unwrap();
    let template = device(&dir.path().join("work.XXXXXX"));
    let shell = shell();

    let first = shell.create_temp_file(&template).unwrap();
    let second = shell.create_temp_file(&template).unwrap();
    assert_ne!(first, second);
    assert!(shell.is_file(&first).unwrap());

    let tmpdir = shell.create_temp_dir(&template).unwrap();
    assert!(shell.is_directory(&tmpdir).unwrap());
}

#[test]
fn device_environment_contains_path() {
    let env = shell().device_environment().unwrap();
    assert!(env.iter().any(|(key, _)| key == "PATH"));
}

#[test]
fn free_space_parses_from_df() {
    assert!(shell().bytes_available(&DevicePath::parse("/")).unwrap() > 0);
}

#[test]
fn removal_guard_refuses_system_paths() {
    let shell = shell();
    for victim in ["/a/b", "/home/user", "/usr", "/", "/tmp", "/tmp/"] {
        assert!(shell
            .remove_recursively(&DevicePath::parse(victim))
            .unwrap_err()
            .is_refusal());
    }
}
