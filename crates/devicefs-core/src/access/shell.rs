//! Shell-command backend for remote devices.
//!
//! Implements the capability interface by running standard Unix tools
//! (`test`, `stat`, `find`, `dd`, `rm`, ...) through a [`CommandRunner`]
//! supplied by the embedding environment. The backend never sees a socket or
//! a container API; it only composes argument vectors and parses tool
//! output. `stat` and `find` syntax differs between GNU and BSD userlands,
//! so every format string is selected by the device's [`OsKind`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::command::{CommandOutput, CommandRunner};
use crate::device_path::{clean_path, DevicePath};
use crate::error::{FsError, FsResult};
use crate::os_kind::OsKind;

use super::{
    DeviceFileAccess, DirVisitor, FileFilter, FileId, FileKind, FilePathInfo, IterationControl,
    KindFilter, Permissions,
};

const TEMP_NAME_ATTEMPTS: u32 = 10;
const TEMP_NAME_POOL: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Backend driving one remote device through shell commands.
pub struct ShellDeviceFileAccess {
    runner: Arc<dyn CommandRunner>,
    os: OsKind,
    /// Latched once `find` fails hard on this device; all later directory
    /// iterations go straight to the `ls` strategy.
    find_broken: AtomicBool,
    mktemp_available: OnceCell<bool>,
}

impl ShellDeviceFileAccess {
    pub fn new(runner: Arc<dyn CommandRunner>, os: OsKind) -> Self {
        Self {
            runner,
            os,
            find_broken: AtomicBool::new(false),
            mktemp_available: OnceCell::new(),
        }
    }

    pub fn os_kind(&self) -> OsKind {
        self.os
    }

    fn run(
        &self,
        program: &str,
        args: &[&str],
        stdin: Option<&[u8]>,
    ) -> FsResult<CommandOutput> {
        let owned: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.runner.run(program, &owned, stdin)
    }

    /// Run and require exit code 0; a non-zero exit becomes a
    /// `CommandFailed` error carrying the command line and its stderr.
    fn run_ok(
        &self,
        program: &str,
        args: &[&str],
        stdin: Option<&[u8]>,
    ) -> FsResult<CommandOutput> {
        let output = self.run(program, args, stdin)?;
        if output.success() {
            Ok(output)
        } else {
            Err(FsError::command_failed(
                render_command(program, args),
                output.exit_code,
                output.stderr_text(),
            ))
        }
    }

    /// `test` with the given expression; exit 0 is true, exit 1 is a clean
    /// false. Only a spawn failure is an error.
    fn probe(&self, expr: &[&str]) -> FsResult<bool> {
        Ok(self.run("test", expr, None)?.success())
    }

    /// One `stat` field, format selected per userland.
    fn stat_text(&self, path: &DevicePath, linux_fmt: &str, mac_fmt: &str) -> FsResult<String> {
        let output = match self.os {
            OsKind::MacOs => self.run_ok("stat", &["-L", "-f", mac_fmt, path.path()], None)?,
            _ => self.run_ok("stat", &["-L", "-c", linux_fmt, path.path()], None)?,
        };
        Ok(output.stdout_text().trim().to_string())
    }

    fn mktemp_usable(&self) -> bool {
        *self.mktemp_available.get_or_init(|| {
            self.run("mktemp", &["-u", "/tmp/devicefs_probe.XXXXXX"], None)
                .map(|out| out.success())
                .unwrap_or(false)
        })
    }

    /// A template whose name ends in a run of `X` placeholders; appends
    /// `XXXXXX` when the template has none.
    fn normalized_template(template: &DevicePath) -> String {
        if template.file_name().ends_with('X') {
            template.path().to_string()
        } else {
            format!("{}.XXXXXX", template.path())
        }
    }

    /// Replace the trailing `X` run with random alphanumerics.
    fn randomized_name(template: &str) -> String {
        let placeholders = template.len() - template.trim_end_matches('X').len();
        let stem = &template[..template.len() - placeholders];
        let mut random = vec![0u8; placeholders];
        OsRng.fill_bytes(&mut random);
        let mut name = String::with_capacity(template.len());
        name.push_str(stem);
        for byte in random {
            name.push(TEMP_NAME_POOL[byte as usize % TEMP_NAME_POOL.len()] as char);
        }
        name
    }

    fn create_temp(&self, template: &DevicePath, directory: bool) -> FsResult<DevicePath> {
        let template_text = Self::normalized_template(template);
        if self.mktemp_usable() {
            let output = if directory {
                self.run_ok("mktemp", &["-d", &template_text], None)?
            } else {
                self.run_ok("mktemp", &[template_text.as_str()], None)?
            };
            let created = output.stdout_text().trim().to_string();
            if created.is_empty() {
                return Err(FsError::other("mktemp produced no path"));
            }
            return Ok(template.with_new_path(created));
        }
        for _ in 0..TEMP_NAME_ATTEMPTS {
            let candidate = template.with_new_path(Self::randomized_name(&template_text));
            if self.probe(&["-e", candidate.path()])? {
                continue;
            }
            let result = if directory {
                self.run_ok("mkdir", &[candidate.path()], None)
            } else {
                self.run_ok("touch", &[candidate.path()], None)
            };
            if result.is_ok() {
                return Ok(candidate);
            }
        }
        Err(FsError::other(format!(
            "no unique temporary name found for template {}",
            template.to_display_string(false)
        )))
    }

    /// Directory listing via `find`. `Ok(false)` means `find` is unusable on
    /// this device; the caller falls back to `ls` and the latch keeps later
    /// iterations off `find` entirely.
    fn iterate_with_find(
        &self,
        path: &DevicePath,
        filter: &FileFilter,
        visit: &mut DirVisitor<'_>,
    ) -> FsResult<bool> {
        let mut args: Vec<String> = Vec::new();
        if filter.follow_symlinks {
            args.push("-L".to_string());
        }
        args.push(path.path().to_string());
        args.push("-mindepth".to_string());
        args.push("1".to_string());
        if !filter.recursive {
            args.push("-maxdepth".to_string());
            args.push("1".to_string());
        }
        match filter.kind {
            KindFilter::FilesOnly => {
                args.push("-type".to_string());
                args.push("f".to_string());
            }
            KindFilter::DirectoriesOnly => {
                args.push("-type".to_string());
                args.push("d".to_string());
            }
            KindFilter::All => {}
        }
        if !filter.name_patterns.is_empty() {
            let name_op = if filter.case_insensitive { "-iname" } else { "-name" };
            args.push("(".to_string());
            for (i, pattern) in filter.name_patterns.iter().enumerate() {
                if i > 0 {
                    args.push("-o".to_string());
                }
                args.push(name_op.to_string());
                args.push(pattern.clone());
            }
            args.push(")".to_string());
        }
        if filter.with_info {
            // One stat per entry, inline: the quoted %n/%N lets the parser
            // find the end of names containing spaces.
            args.push("-exec".to_string());
            args.push("stat".to_string());
            args.push("-L".to_string());
            match self.os {
                OsKind::MacOs => {
                    args.push("-f".to_string());
                    args.push("\"%N\" %p %m %z".to_string());
                }
                _ => {
                    args.push("-c".to_string());
                    args.push("\"%n\" %f %Y %s".to_string());
                }
            }
            args.push("{}".to_string());
            args.push(";".to_string());
        } else {
            args.push("-print".to_string());
        }

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run("find", &arg_refs, None)?;
        if !output.success() && output.stdout.is_empty() {
            // Missing binary, unsupported predicate, or unreadable root.
            // Remember and stop trying.
            log::debug!(
                "find failed on device (exit {:?}): {}",
                output.exit_code,
                output.stderr_text().trim()
            );
            self.find_broken.store(true, Ordering::Relaxed);
            return Ok(false);
        }

        for line in output.stdout_text().lines() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let (entry, info) = if filter.with_info {
                match self.parse_stat_line(line) {
                    Some((name, info)) => (path.with_new_path(name), Some(info)),
                    None => {
                        log::debug!("unparseable stat line from find: {line}");
                        continue;
                    }
                }
            } else {
                (path.with_new_path(line), None)
            };
            if let Some(info) = &info {
                if !filter.accepts_kind(info.kind) {
                    continue;
                }
            }
            if visit(&entry, info.as_ref()) == IterationControl::Stop {
                break;
            }
        }
        Ok(true)
    }

    /// Parse one `"name" mode mtime size` line from the inline stat. The
    /// closing quote is found from the right, so names containing quotes
    /// still parse as long as they do not end in `" ` followed by three
    /// numeric fields, which is the documented limitation of this format.
    fn parse_stat_line(&self, line: &str) -> Option<(String, FilePathInfo)> {
        let rest = line.strip_prefix('"')?;
        let sep = rest.rfind("\" ")?;
        let name = &rest[..sep];
        let fields: Vec<&str> = rest[sep + 2..].split_whitespace().collect();
        if fields.len() != 3 {
            return None;
        }
        let radix = match self.os {
            OsKind::MacOs => 8,
            _ => 16,
        };
        let mode = u32::from_str_radix(fields[0], radix).ok()?;
        let modified_secs = fields[1].parse::<i64>().ok()?;
        let file_size = fields[2].parse::<u64>().ok()?;
        Some((
            name.to_string(),
            FilePathInfo {
                file_size,
                modified_secs,
                kind: FileKind::from_unix_mode(mode),
                permissions: Permissions::from_unix_mode(mode),
            },
        ))
    }

    /// Fallback listing via `ls -1 -a -p`, recursing manually. Entries with a
    /// trailing slash are directories; filtering happens client-side.
    fn iterate_with_ls(
        &self,
        root: &DevicePath,
        filter: &FileFilter,
        visit: &mut DirVisitor<'_>,
    ) -> FsResult<()> {
        let mut queue = vec![root.clone()];
        while let Some(dir) = queue.pop() {
            let output = self.run_ok("ls", &["-1", "-a", "-p", dir.path()], None)?;
            for line in output.stdout_text().lines() {
                if line.is_empty() || line == "./" || line == "../" {
                    continue;
                }
                let is_dir = line.ends_with('/');
                let name = line.trim_end_matches('/');
                let entry = dir.join(name);
                if is_dir && filter.recursive {
                    queue.push(entry.clone());
                }
                let kind = if is_dir { FileKind::Directory } else { FileKind::File };
                if !filter.accepts_kind(kind) || !filter.matches_name(name) {
                    continue;
                }
                let info = if filter.with_info {
                    self.file_path_info(&entry).ok()
                } else {
                    None
                };
                if visit(&entry, info.as_ref()) == IterationControl::Stop {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

fn render_command(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    }
}

/// Depth guard for recursive removal on a remote device, where a bad path
/// cannot be double-checked against a trash bin. The path must be absolute
/// and deep enough that it cannot name a whole system area: at least three
/// components in general, four under `/home`, two under `/tmp`.
fn removal_depth_ok(path: &DevicePath) -> bool {
    if !path.is_absolute_path() {
        return false;
    }
    // Count separators on the cleaned path so trailing or duplicate slashes
    // cannot inflate the depth ("/tmp/" is still "/tmp").
    let cleaned = clean_path(path.path());
    let separators = cleaned.matches('/').count();
    let required = if cleaned == "/tmp" {
        usize::MAX
    } else if cleaned.starts_with("/tmp/") {
        2
    } else if cleaned.starts_with("/home/") {
        4
    } else {
        3
    };
    separators >= required
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

impl DeviceFileAccess for ShellDeviceFileAccess {
    fn backend_name(&self) -> &'static str {
        "shell"
    }

    fn exists(&self, path: &DevicePath) -> FsResult<bool> {
        self.probe(&["-e", path.path()])
    }

    fn is_file(&self, path: &DevicePath) -> FsResult<bool> {
        self.probe(&["-f", path.path()])
    }

    fn is_directory(&self, path: &DevicePath) -> FsResult<bool> {
        self.probe(&["-d", path.path()])
    }

    fn is_symlink(&self, path: &DevicePath) -> FsResult<bool> {
        self.probe(&["-h", path.path()])
    }

    fn is_readable_file(&self, path: &DevicePath) -> FsResult<bool> {
        self.probe(&["-r", path.path(), "-a", "-f", path.path()])
    }

    fn is_readable_directory(&self, path: &DevicePath) -> FsResult<bool> {
        self.probe(&["-r", path.path(), "-a", "-d", path.path()])
    }

    fn is_writable_file(&self, path: &DevicePath) -> FsResult<bool> {
        self.probe(&["-w", path.path(), "-a", "-f", path.path()])
    }

    fn is_writable_directory(&self, path: &DevicePath) -> FsResult<bool> {
        self.probe(&["-w", path.path(), "-a", "-d", path.path()])
    }

    fn is_executable_file(&self, path: &DevicePath) -> FsResult<bool> {
        self.probe(&["-x", path.path(), "-a", "-f", path.path()])
    }

    fn create_directory(&self, path: &DevicePath) -> FsResult<()> {
        self.run_ok("mkdir", &["-p", path.path()], None).map(|_| ())
    }

    fn ensure_existing_file(&self, path: &DevicePath) -> FsResult<()> {
        if self.exists(path)? {
            if self.is_file(path)? {
                return Ok(());
            }
            return Err(FsError::other(format!(
                "{} exists but is not a file",
                path.to_display_string(false)
            )));
        }
        let parent = path.parent_directory();
        if !parent.path().is_empty() {
            self.create_directory(&parent)?;
        }
        self.run_ok("touch", &[path.path()], None).map(|_| ())
    }

    fn remove_file(&self, path: &DevicePath) -> FsResult<()> {
        self.run_ok("rm", &["--", path.path()], None).map(|_| ())
    }

    fn remove_recursively(&self, path: &DevicePath) -> FsResult<()> {
        if !removal_depth_ok(path) {
            return Err(FsError::refused(
                "path is too shallow for recursive removal on a device",
                Some(path.to_display_string(false)),
            ));
        }
        self.run_ok("rm", &["-r", "-f", "--", path.path()], None)
            .map(|_| ())
    }

    fn copy_file(&self, source: &DevicePath, target: &DevicePath) -> FsResult<()> {
        self.run_ok("cp", &["--", source.path(), target.path()], None)
            .map(|_| ())
    }

    fn copy_recursively(&self, source: &DevicePath, target: &DevicePath) -> FsResult<()> {
        if !self.is_directory(source)? {
            return Err(FsError::other(format!(
                "{} is not a directory",
                source.to_display_string(false)
            )));
        }
        self.ensure_writable_directory(target)?;
        // Copying `source/.` merges into the target instead of nesting a new
        // directory under it.
        let contents = format!("{}/.", source.path());
        self.run_ok("cp", &["-R", "--", &contents, target.path()], None)
            .map(|_| ())
    }

    fn create_symlink(&self, target: &DevicePath, link: &DevicePath) -> FsResult<()> {
        self.run_ok("ln", &["-s", "--", target.path(), link.path()], None)
            .map(|_| ())
    }

    fn rename_file(&self, source: &DevicePath, target: &DevicePath) -> FsResult<()> {
        self.run_ok("mv", &["--", source.path(), target.path()], None)
            .map(|_| ())
    }

    fn sym_link_target(&self, path: &DevicePath) -> FsResult<DevicePath> {
        let output = self.run_ok("readlink", &[path.path()], None)?;
        let target = output.stdout_text().trim().to_string();
        if target.is_empty() {
            return Err(FsError::other(format!(
                "{} is not a symlink",
                path.to_display_string(false)
            )));
        }
        Ok(path.with_new_path(target))
    }

    fn iterate_directory(
        &self,
        path: &DevicePath,
        filter: &FileFilter,
        visit: &mut DirVisitor<'_>,
    ) -> FsResult<()> {
        if !self.find_broken.load(Ordering::Relaxed)
            && self.iterate_with_find(path, filter, visit)?
        {
            return Ok(());
        }
        self.iterate_with_ls(path, filter, visit)
    }

    fn file_contents(
        &self,
        path: &DevicePath,
        limit: Option<u64>,
        offset: u64,
    ) -> FsResult<Vec<u8>> {
        if limit == Some(0) {
            return Ok(Vec::new());
        }
        if limit.is_none() && offset == 0 {
            return Ok(self.run_ok("cat", &["--", path.path()], None)?.stdout);
        }
        let if_arg = format!("if={}", path.path());
        let mut args: Vec<String> = vec![if_arg];
        if self.os != OsKind::MacOs {
            args.push("status=none".to_string());
        }
        match limit {
            Some(limit) => {
                // Block size is the gcd of limit and offset so both the skip
                // and the count are whole blocks.
                let bs = if offset == 0 { limit } else { gcd(limit, offset) };
                args.push(format!("bs={bs}"));
                args.push(format!("count={}", limit / bs));
                if offset > 0 {
                    args.push(format!("skip={}", offset / bs));
                }
            }
            None => {
                // Skip one offset-sized block, then read to the end.
                args.push(format!("bs={offset}"));
                args.push("skip=1".to_string());
            }
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        Ok(self.run_ok("dd", &arg_refs, None)?.stdout)
    }

    fn write_file_contents(&self, path: &DevicePath, data: &[u8]) -> FsResult<u64> {
        let of_arg = format!("of={}", path.path());
        let mut args: Vec<&str> = vec![&of_arg];
        if self.os != OsKind::MacOs {
            args.push("status=none");
        }
        self.run_ok("dd", &args, Some(data))?;
        Ok(data.len() as u64)
    }

    fn file_path_info(&self, path: &DevicePath) -> FsResult<FilePathInfo> {
        let text = self.stat_text(path, "%f %Y %s", "%p %m %z")?;
        let fields: Vec<&str> = text.split_whitespace().collect();
        if fields.len() != 3 {
            return Err(FsError::other(format!("unexpected stat output '{text}'")));
        }
        let radix = match self.os {
            OsKind::MacOs => 8,
            _ => 16,
        };
        let mode = u32::from_str_radix(fields[0], radix)
            .map_err(|_| FsError::other(format!("unexpected stat mode '{}'", fields[0])))?;
        let modified_secs = fields[1]
            .parse::<i64>()
            .map_err(|_| FsError::other(format!("unexpected stat mtime '{}'", fields[1])))?;
        let file_size = fields[2]
            .parse::<u64>()
            .map_err(|_| FsError::other(format!("unexpected stat size '{}'", fields[2])))?;
        Ok(FilePathInfo {
            file_size,
            modified_secs,
            kind: FileKind::from_unix_mode(mode),
            permissions: Permissions::from_unix_mode(mode),
        })
    }

    fn set_permissions(&self, path: &DevicePath, permissions: Permissions) -> FsResult<()> {
        self.run_ok(
            "chmod",
            &[&permissions.to_octal_string(), "--", path.path()],
            None,
        )
        .map(|_| ())
    }

    fn owner(&self, path: &DevicePath) -> FsResult<String> {
        self.stat_text(path, "%U", "%Su")
    }

    fn owner_id(&self, path: &DevicePath) -> FsResult<u32> {
        let text = self.stat_text(path, "%u", "%u")?;
        text.parse()
            .map_err(|_| FsError::other(format!("unexpected stat uid '{text}'")))
    }

    fn group(&self, path: &DevicePath) -> FsResult<String> {
        self.stat_text(path, "%G", "%Sg")
    }

    fn group_id(&self, path: &DevicePath) -> FsResult<u32> {
        let text = self.stat_text(path, "%g", "%g")?;
        text.parse()
            .map_err(|_| FsError::other(format!("unexpected stat gid '{text}'")))
    }

    fn bytes_available(&self, path: &DevicePath) -> FsResult<u64> {
        let output = self.run_ok("df", &["-k", path.path()], None)?;
        let text = output.stdout_text();
        let line = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .last()
            .ok_or_else(|| FsError::other("empty df output"))?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        let available_kb: u64 = fields
            .get(3)
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| FsError::other(format!("unexpected df output '{line}'")))?;
        Ok(available_kb * 1024)
    }

    fn file_id(&self, path: &DevicePath) -> FsResult<FileId> {
        let text = self.stat_text(path, "%d:%i", "%d:%i")?;
        if text.is_empty() {
            return Err(FsError::not_found(path.to_display_string(false)));
        }
        Ok(FileId::new(text))
    }

    fn refers_to_executable_file(&self, path: &DevicePath) -> FsResult<Option<DevicePath>> {
        if self.is_executable_file(path)? {
            return Ok(Some(path.clone()));
        }
        if path.suffix().is_empty() {
            for suffix in self.os.exec_suffixes() {
                let candidate = path.with_new_path(format!("{}{}", path.path(), suffix));
                if self.is_executable_file(&candidate)? {
                    return Ok(Some(candidate));
                }
            }
        }
        Ok(None)
    }

    fn create_temp_file(&self, template: &DevicePath) -> FsResult<DevicePath> {
        self.create_temp(template, false)
    }

    fn create_temp_dir(&self, template: &DevicePath) -> FsResult<DevicePath> {
        self.create_temp(template, true)
    }

    fn device_environment(&self) -> FsResult<Vec<(String, String)>> {
        let output = self.run_ok("env", &[], None)?;
        Ok(output
            .stdout_text()
            .lines()
            .filter_map(|line| {
                line.split_once('=')
                    .map(|(k, v)| (k.to_string(), v.to_string()))
            })
            .collect())
    }

    fn supports_atomic_save_file(&self, path: &DevicePath) -> FsResult<bool> {
        // Atomic replace would sever the other names of a hard-linked file.
        let text = self.stat_text(path, "%h", "%l")?;
        match text.parse::<u64>() {
            Ok(links) => Ok(links <= 1),
            Err(_) => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Fake runner answering from a handler closure and recording every
    /// issued command line.
    struct ScriptedRunner {
        log: Mutex<Vec<String>>,
        handler: Box<dyn Fn(&str, &[String]) -> CommandOutput + Send + Sync>,
    }

    impl ScriptedRunner {
        fn new(
            handler: impl Fn(&str, &[String]) -> CommandOutput + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                log: Mutex::new(Vec::new()),
                handler: Box::new(handler),
            })
        }

        fn commands(&self) -> Vec<String> {
            self.log.lock().clone()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(
            &self,
            program: &str,
            args: &[String],
            _stdin: Option<&[u8]>,
        ) -> FsResult<CommandOutput> {
            self.log
                .lock()
                .push(format!("{program} {}", args.join(" ")).trim().to_string());
            Ok((self.handler)(program, args))
        }
    }

    fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            exit_code: Some(0),
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
        }
    }

    fn fail(code: i32, stderr: &str) -> CommandOutput {
        CommandOutput {
            exit_code: Some(code),
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    fn backend(runner: Arc<ScriptedRunner>) -> ShellDeviceFileAccess {
        ShellDeviceFileAccess::new(runner, OsKind::Linux)
    }

    fn path(p: &str) -> DevicePath {
        DevicePath::parse(p)
    }

    #[test]
    fn predicates_map_exit_codes_to_booleans() {
        let runner = ScriptedRunner::new(|program, args| {
            assert_eq!(program, "test");
            if args.iter().any(|a| a.contains("present")) {
                ok("")
            } else {
                fail(1, "")
            }
        });
        let access = backend(runner.clone());
        assert!(access.exists(&path("/present")).unwrap());
        assert!(!access.exists(&path("/absent")).unwrap());
        assert_eq!(
            runner.commands(),
            vec!["test -e /present", "test -e /absent"]
        );
    }

    #[test]
    fn readable_file_probe_checks_both_conditions() {
        let runner = ScriptedRunner::new(|_, _| ok(""));
        let access = backend(runner.clone());
        assert!(access.is_readable_file(&path("/etc/fstab")).unwrap());
        assert_eq!(
            runner.commands(),
            vec!["test -r /etc/fstab -a -f /etc/fstab"]
        );
    }

    #[test]
    fn whole_file_reads_use_cat() {
        let runner = ScriptedRunner::new(|program, _| {
            assert_eq!(program, "cat");
            ok("payload")
        });
        let access = backend(runner.clone());
        let data = access.file_contents(&path("/f"), None, 0).unwrap();
        assert_eq!(data, b"payload");
        assert_eq!(runner.commands(), vec!["cat -- /f"]);
    }

    #[test]
    fn ranged_reads_compose_dd_block_arithmetic() {
        let runner = ScriptedRunner::new(|_, _| ok(""));
        let access = backend(runner.clone());
        access.file_contents(&path("/f"), Some(100), 1024).unwrap();
        // gcd(100, 1024) = 4: count 25 blocks after skipping 256.
        assert_eq!(
            runner.commands(),
            vec!["dd if=/f status=none bs=4 count=25 skip=256"]
        );
    }

    #[test]
    fn unbounded_offset_read_skips_one_block() {
        let runner = ScriptedRunner::new(|_, _| ok(""));
        let access = backend(runner.clone());
        access.file_contents(&path("/f"), None, 4096).unwrap();
        assert_eq!(
            runner.commands(),
            vec!["dd if=/f status=none bs=4096 skip=1"]
        );
    }

    #[test]
    fn stat_info_parses_hex_mode_on_linux() {
        let runner = ScriptedRunner::new(|program, _| {
            assert_eq!(program, "stat");
            ok("81a4 1724000000 532\n")
        });
        let access = backend(runner);
        let info = access.file_path_info(&path("/f")).unwrap();
        assert_eq!(info.kind, FileKind::File);
        assert_eq!(info.permissions, Permissions::from_unix_mode(0o644));
        assert_eq!(info.modified_secs, 1724000000);
        assert_eq!(info.file_size, 532);
    }

    #[test]
    fn stat_info_parses_octal_mode_on_macos() {
        let runner = ScriptedRunner::new(|_, _| ok("40755 1724000000 96\n"));
        let access = ShellDeviceFileAccess::new(runner, OsKind::MacOs);
        let info = access.file_path_info(&path("/dir")).unwrap();
        assert_eq!(info.kind, FileKind::Directory);
        assert_eq!(info.permissions, Permissions::from_unix_mode(0o755));
    }

    #[test]
    fn shallow_removals_are_refused_without_running_anything() {
        let runner = ScriptedRunner::new(|_, _| ok(""));
        let access = backend(runner.clone());
        for victim in ["/a/b", "/home/user", "relative/path", "/tmp", "/tmp/", "/tmp//", "/usr", "/usr/"] {
            let err = access.remove_recursively(&path(victim)).unwrap_err();
            assert!(err.is_refusal(), "{victim} should be refused");
        }
        assert!(runner.commands().is_empty());

        access.remove_recursively(&path("/opt/project/build")).unwrap();
        access.remove_recursively(&path("/tmp/scratch")).unwrap();
        access
            .remove_recursively(&path("/home/user/project/out"))
            .unwrap();
        assert_eq!(
            runner.commands(),
            vec![
                "rm -r -f -- /opt/project/build",
                "rm -r -f -- /tmp/scratch",
                "rm -r -f -- /home/user/project/out"
            ]
        );
    }

    #[test]
    fn failed_commands_surface_stderr() {
        let runner = ScriptedRunner::new(|_, _| fail(1, "rm: permission denied\n"));
        let access = backend(runner);
        let err = access.remove_file(&path("/protected/file")).unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("permission denied"), "{rendered}");
        assert!(rendered.contains("exit 1"), "{rendered}");
    }

    #[test]
    fn find_output_without_info_yields_paths() {
        let runner = ScriptedRunner::new(|program, _| {
            assert_eq!(program, "find");
            ok("/work/a.qml\n/work/sub/b.qml\n")
        });
        let access = backend(runner.clone());
        let mut filter = FileFilter::new().with_patterns(["*.qml"]);
        filter.recursive = true;
        let mut seen = Vec::new();
        access
            .iterate_directory(&path("/work"), &filter, &mut |entry, info| {
                assert!(info.is_none());
                seen.push(entry.path().to_string());
                IterationControl::Continue
            })
            .unwrap();
        assert_eq!(seen, vec!["/work/a.qml", "/work/sub/b.qml"]);
        assert_eq!(
            runner.commands(),
            vec!["find /work -mindepth 1 ( -name *.qml ) -print"]
        );
    }

    #[test]
    fn find_with_info_parses_quoted_stat_lines() {
        let runner = ScriptedRunner::new(|_, _| {
            ok("\"/work/my file.txt\" 81a4 1724000000 10\n\"/work/dir\" 41ed 1724000001 4096\n")
        });
        let access = backend(runner);
        let mut filter = FileFilter::new();
        filter.with_info = true;
        let mut seen = Vec::new();
        access
            .iterate_directory(&path("/work"), &filter, &mut |entry, info| {
                let info = info.expect("info requested");
                seen.push((entry.path().to_string(), info.kind));
                IterationControl::Continue
            })
            .unwrap();
        assert_eq!(
            seen,
            vec![
                ("/work/my file.txt".to_string(), FileKind::File),
                ("/work/dir".to_string(), FileKind::Directory)
            ]
        );
    }

    #[test]
    fn broken_find_latches_onto_ls_fallback() {
        let runner = ScriptedRunner::new(|program, args| match program {
            "find" => fail(127, "find: not found\n"),
            "ls" => {
                if args.last().map(String::as_str) == Some("/work") {
                    ok("./\n../\na.txt\nsub/\n")
                } else {
                    ok("./\n../\nb.txt\n")
                }
            }
            other => panic!("unexpected command {other}"),
        });
        let access = backend(runner.clone());
        let mut filter = FileFilter::new();
        filter.recursive = true;

        let mut seen = Vec::new();
        access
            .iterate_directory(&path("/work"), &filter, &mut |entry, _| {
                seen.push(entry.path().to_string());
                IterationControl::Continue
            })
            .unwrap();
        seen.sort();
        assert_eq!(seen, vec!["/work/a.txt", "/work/sub", "/work/sub/b.txt"]);

        // The latch keeps the second iteration off find entirely.
        access
            .iterate_directory(&path("/work"), &FileFilter::new(), &mut |_, _| {
                IterationControl::Continue
            })
            .unwrap();
        let finds = runner
            .commands()
            .iter()
            .filter(|c| c.starts_with("find"))
            .count();
        assert_eq!(finds, 1);
    }

    #[test]
    fn mktemp_fallback_generates_unique_names() {
        let runner = ScriptedRunner::new(|program, args| match program {
            // mktemp probe fails: the device has no mktemp.
            "mktemp" => fail(127, "mktemp: not found\n"),
            "test" => fail(1, ""),
            "touch" => {
                let created = args.last().unwrap();
                assert!(created.starts_with("/tmp/work/puppet."));
                assert!(!created.ends_with('X'));
                ok("")
            }
            other => panic!("unexpected command {other}"),
        });
        let access = backend(runner);
        let created = access
            .create_temp_file(&path("/tmp/work/puppet.XXXXXX"))
            .unwrap();
        assert_eq!(created.path().len(), "/tmp/work/puppet.XXXXXX".len());
        assert!(!created.path().ends_with("XXXXXX"));
    }

    #[test]
    fn mktemp_is_used_when_available() {
        let runner = ScriptedRunner::new(|program, args| {
            assert_eq!(program, "mktemp");
            if args.first().map(String::as_str) == Some("-u") {
                ok("/tmp/devicefs_probe.k2j3h4\n")
            } else {
                ok("/data/tmp.a1b2c3\n")
            }
        });
        let access = backend(runner.clone());
        let created = access.create_temp_file(&path("/data/tmp.XXXXXX")).unwrap();
        assert_eq!(created.path(), "/data/tmp.a1b2c3");
        assert_eq!(created.scheme(), "");
    }

    #[test]
    fn templates_without_placeholders_are_extended() {
        assert_eq!(
            ShellDeviceFileAccess::normalized_template(&path("/tmp/work/session")),
            "/tmp/work/session.XXXXXX"
        );
        assert_eq!(
            ShellDeviceFileAccess::normalized_template(&path("/tmp/work/session.XX")),
            "/tmp/work/session.XX"
        );
    }

    #[test]
    fn environment_lines_parse_into_pairs() {
        let runner = ScriptedRunner::new(|_, _| ok("PATH=/usr/bin\nHOME=/root\nEMPTY=\n"));
        let access = backend(runner);
        let env = access.device_environment().unwrap();
        assert!(env.contains(&("PATH".to_string(), "/usr/bin".to_string())));
        assert!(env.contains(&("EMPTY".to_string(), String::new())));
    }

    #[test]
    fn df_output_yields_bytes() {
        let runner = ScriptedRunner::new(|_, _| {
            ok("Filesystem 1K-blocks Used Available Use% Mounted on\n/dev/sda1 1000000 250000 750000 25% /\n")
        });
        let access = backend(runner);
        assert_eq!(access.bytes_available(&path("/")).unwrap(), 750000 * 1024);
    }

    #[test]
    fn device_paths_report_shell_backend_semantics() {
        let runner = ScriptedRunner::new(|_, _| ok(""));
        let access = backend(runner.clone());
        // A device-qualified path flows through unchanged: the backend only
        // ever sees the path component.
        let remote = DevicePath::parse("docker://1234/work/scene.qml");
        assert!(access.exists(&remote).unwrap());
        assert_eq!(runner.commands(), vec!["test -e /work/scene.qml"]);
    }
}
