//! Physical Repository (C1) — owns one on-disk trash directory and
//! implements put/list/unlink/shred/restore/cleanup against the FreeDesktop
//! trash layout.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{Local, NaiveDateTime};
use rand::{Rng, RngCore};

use crate::error::{MoveError, RepositoryError, TrashInfoReadError};
use crate::util::{can_delete_file, get_dir_size, must_have_dir};

/// How a repository's base directory should be created and checked: mode
/// bits and hidden-vs-visible naming differ between the home trash and a
/// non-home (mounted volume) trash.
pub trait DirectoryAttributes: Send + Sync {
    /// Mode a freshly created `[.]Trash` directory should have.
    fn mode(&self) -> u32;
    /// Whether an existing directory's mode satisfies this attribute set.
    fn check(&self, mode: u32) -> bool;
    /// `true` for `.Trash` (hidden), `false` for `Trash` (visible).
    fn hidden(&self) -> bool;
    fn trash_dir_name(&self) -> &'static str {
        if self.hidden() {
            ".Trash"
        } else {
            "Trash"
        }
    }
}

pub struct HomeAttributes;

impl DirectoryAttributes for HomeAttributes {
    fn mode(&self) -> u32 {
        0o700
    }
    fn check(&self, mode: u32) -> bool {
        mode & 0o700 == 0o700
    }
    fn hidden(&self) -> bool {
        false
    }
}

pub struct TopAttributes;

impl DirectoryAttributes for TopAttributes {
    fn mode(&self) -> u32 {
        0o777
    }
    fn check(&self, mode: u32) -> bool {
        mode & 0o777 != 0
    }
    fn hidden(&self) -> bool {
        true
    }
}

/// Pluggable strategy for transferring bytes from the original location to
/// `files/<trashname>`.
pub trait Mover: Send + Sync {
    fn move_file(&self, from: &Path, to: &Path) -> Result<(), MoveError>;
}

/// A single `rename(2)`. Fails with `NonRenamable` on cross-device moves.
pub struct RenameOnly;

impl Mover for RenameOnly {
    fn move_file(&self, from: &Path, to: &Path) -> Result<(), MoveError> {
        if from.symlink_metadata().is_err() {
            return Err(MoveError::FileToTrashDoesNotExist(from.to_path_buf()));
        }

        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::EXDEV) => Err(MoveError::NonRenamable {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
            }),
            Err(e) => Err(MoveError::CanNotMoveToTrash {
                errno: e.raw_os_error().unwrap_or(0),
            }),
        }
    }
}

/// Streams bytes across devices, then deletes the source. If the delete
/// fails, the partial destination is removed and the error is reported.
pub struct CopyThenDelete;

impl Mover for CopyThenDelete {
    fn move_file(&self, from: &Path, to: &Path) -> Result<(), MoveError> {
        let meta = from.symlink_metadata().map_err(|_| {
            MoveError::FileToTrashDoesNotExist(from.to_path_buf())
        })?;

        let copy_result = if meta.file_type().is_symlink() {
            let target = fs::read_link(from)?;
            std::os::unix::fs::symlink(&target, to)
        } else if meta.is_dir() {
            copy_dir_all(from, to)
        } else {
            let _ = fs::set_permissions(from, fs::Permissions::from_mode(0o777));
            fs::copy(from, to).map(|_| ())
        };

        if let Err(e) = copy_result {
            return Err(MoveError::CanNotMoveFile {
                source: from.to_path_buf(),
                destination: to.to_path_buf(),
                reason: e.to_string(),
            });
        }

        let removal = if meta.is_dir() && !meta.file_type().is_symlink() {
            fs::remove_dir_all(from)
        } else {
            fs::remove_file(from)
        };

        if let Err(e) = removal {
            // can't delete the source: drop the partial destination and report.
            if meta.is_dir() {
                let _ = fs::remove_dir_all(to);
            } else {
                let _ = fs::remove_file(to);
            }
            return Err(MoveError::CanNotMoveFile {
                source: from.to_path_buf(),
                destination: to.to_path_buf(),
                reason: e.to_string(),
            });
        }

        Ok(())
    }
}

fn copy_dir_all(from: &Path, to: &Path) -> std::io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        let meta = entry.metadata()?;
        if meta.is_dir() {
            copy_dir_all(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

/// Rename, falling back to copy+delete on any failure. Used for the
/// device-top and home-try-anything router fallbacks.
pub struct TryAnything;

impl Mover for TryAnything {
    fn move_file(&self, from: &Path, to: &Path) -> Result<(), MoveError> {
        match RenameOnly.move_file(from, to) {
            Ok(()) => Ok(()),
            Err(_) => CopyThenDelete.move_file(from, to),
        }
    }
}

/// Read view of one trashed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrashItem {
    pub trashname: String,
    pub original_path: PathBuf,
    pub deletion_time: NaiveDateTime,
}

/// Parsed/serialized `info/<trashname>.trashinfo` contents.
pub struct InfoFile;

impl InfoFile {
    pub fn read(path: &Path, trashname: &str) -> Result<TrashItem, TrashInfoReadError> {
        let mut contents = String::new();
        File::open(path)
            .map_err(TrashInfoReadError::CantOpenDir)?
            .read_to_string(&mut contents)
            .map_err(TrashInfoReadError::CantOpenDir)?;

        let mut lines = contents.lines().filter(|l| !l.trim().is_empty());
        match lines.next() {
            Some(header) if header.trim() == "[Trash Info]" => {}
            _ => return Err(TrashInfoReadError::MissingHeader),
        }

        let mut path_value: Option<String> = None;
        let mut date_value: Option<String> = None;
        for line in lines {
            if let Some(v) = line.strip_prefix("Path=") {
                path_value = Some(v.to_string());
            } else if let Some(v) = line.strip_prefix("DeletionDate=") {
                date_value = Some(v.to_string());
            }
        }

        let path_value = path_value.ok_or(TrashInfoReadError::MissingName)?;
        let date_value = date_value.ok_or(TrashInfoReadError::MissingDate)?;

        let decoded = urlencoding::decode(&path_value).map_err(|_| TrashInfoReadError::BadFile)?;
        let deletion_time = parse_trash_timestamp(&date_value)?;

        Ok(TrashItem {
            trashname: trashname.to_string(),
            original_path: PathBuf::from(decoded.into_owned()),
            deletion_time,
        })
    }

    pub fn write(path: &Path, original_path: &str, when: NaiveDateTime) -> std::io::Result<()> {
        let encoded = urlencoding::encode(original_path);
        let date = when.format("%Y-%m-%dT%H:%M:%S").to_string();
        let contents = format!("[Trash Info]\nPath={encoded}\nDeletionDate={date}\n");

        let mut f = OpenOptions::new().write(true).create_new(true).open(path)?;
        f.write_all(contents.as_bytes())
    }
}

fn parse_trash_timestamp(s: &str) -> Result<NaiveDateTime, TrashInfoReadError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").map_err(|_| TrashInfoReadError::BadFile)
}

/// A single on-disk trash repository at `<base>/[.]Trash/`.
pub struct PhysicalRepository {
    pub base: PathBuf,
    pub files: PathBuf,
    pub info: PathBuf,
    attrs: Box<dyn DirectoryAttributes>,
    /// `Some(mount_root)` for a non-home repository, whose `Path=` entries
    /// are written relative to `mount_root` and need rejoining before use;
    /// `None` for the home repository, whose entries are already absolute.
    mount_root: Option<PathBuf>,
}

impl PhysicalRepository {
    /// Eagerly ensures `files/` and `info/` exist with the attribute set's
    /// mode, failing if an existing directory has the wrong bits.
    pub fn new(
        attrs: Box<dyn DirectoryAttributes>,
        base_dir: &Path,
        is_home: bool,
    ) -> Result<Self, RepositoryError> {
        let trash_dir = base_dir.join(attrs.trash_dir_name());
        ensure_dir_mode(&trash_dir, attrs.as_ref())?;

        let files = trash_dir.join("files");
        ensure_dir_mode(&files, attrs.as_ref())?;

        let info = trash_dir.join("info");
        ensure_dir_mode(&info, attrs.as_ref())?;

        Ok(PhysicalRepository {
            base: trash_dir,
            files,
            info,
            attrs,
            mount_root: if is_home { None } else { Some(base_dir.to_path_buf()) },
        })
    }

    /// Rejoins a `Path=` value read back against this repository's mount
    /// root when it was written in relative form.
    fn resolve_original_path(&self, raw: PathBuf) -> PathBuf {
        match &self.mount_root {
            Some(root) if raw.is_relative() => root.join(raw),
            _ => raw,
        }
    }

    /// Move `original` into this repository, returning the trashname it was
    /// stored under. `path_key` is what gets written into `Path=` — callers
    /// pass the relative-to-mount form for non-home repositories.
    pub fn add(
        &self,
        original: &Path,
        path_key: &str,
        mover: &dyn Mover,
    ) -> Result<String, RepositoryError> {
        let basename = original
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RepositoryError::CantMakeDirectory(original.to_path_buf()))?;

        let trashname = self.reserve_trashname(basename)?;
        let files_entry = self.files.join(&trashname);
        let info_entry = self.info.join(format!("{trashname}.trashinfo"));

        mover.move_file(original, &files_entry)?;

        let now = Local::now().naive_local();
        if let Err(_e) = InfoFile::write(&info_entry, path_key, now) {
            // roll back the move so the filesystem doesn't end up with an
            // orphaned files/ entry and no matching info/ entry.
            let _ = RenameOnly.move_file(&files_entry, original);
            return Err(RepositoryError::CanNotCreateTrashInfo(trashname));
        }

        if files_entry.is_dir() {
            if let Err(e) = self.update_directory_sizes(&trashname, &files_entry) {
                log::warn!("could not update directorysizes for '{trashname}': {e}");
            }
        }

        Ok(trashname)
    }

    /// Appends (and prunes) an entry in the optional `directorysizes` cache
    /// file documented by the FreeDesktop trash spec, for a just-trashed
    /// directory. Never fails `add` — errors are logged by the caller.
    fn update_directory_sizes(&self, trashname: &str, files_entry: &Path) -> std::io::Result<()> {
        let current = self.base.join("directorysizes");
        if current.exists() && (!current.is_file() || !can_delete_file(&current)) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "directorysizes exists but isn't writable",
            ));
        }

        let size = get_dir_size(files_entry)?;
        let mtime_epoch = fs::metadata(files_entry)?
            .modified()?
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
            .as_secs();
        let encoded_name = urlencoding::encode(trashname).into_owned();

        let mut contents = String::new();
        if let Ok(existing) = fs::read_to_string(&current) {
            for line in existing.lines() {
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() != 3 {
                    continue;
                }
                let Ok(name) = urlencoding::decode(fields[2]) else {
                    continue;
                };
                // an entry for the name we just trashed, or one whose
                // files/ sibling is already gone, is stale.
                if name.as_ref() == trashname || !self.files.join(name.as_ref()).exists() {
                    continue;
                }
                contents.push_str(line);
                contents.push('\n');
            }
        }
        contents.push_str(&format!("{size} {mtime_epoch} {encoded_name}\n"));

        // rename(2) needs the temp file on the same filesystem as the target.
        let temp_dir = self.base.join(".trailer");
        must_have_dir(&temp_dir)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        let temp_path = temp_dir.join(format!(
            "directorysizes-{}",
            rand::thread_rng().gen_range(100_000_000u32..999_999_999u32)
        ));
        fs::write(&temp_path, contents.as_bytes())?;
        fs::rename(&temp_path, &current)
    }

    /// Lowest non-negative `n` such that `files/B` (n=0) or `files/B.n`
    /// (n>=1) doesn't exist. Uses stat presence, not atomic create — a
    /// known single-user race.
    fn reserve_trashname(&self, basename: &str) -> Result<String, RepositoryError> {
        for n in 0..u32::MAX {
            let candidate = if n == 0 {
                basename.to_string()
            } else {
                format!("{basename}.{n}")
            };
            let file = self.files.join(&candidate);
            let info = self.info.join(format!("{candidate}.trashinfo"));
            if !file.exists() && !info.exists() {
                return Ok(candidate);
            }
        }
        Err(RepositoryError::CantMakeDirectory(self.files.clone()))
    }

    /// Enumerate `files/`, reading the matching `info/` entry for each.
    /// Entries whose info file fails to parse are skipped rather than
    /// failing the whole listing.
    pub fn items(&self) -> Result<Vec<TrashItem>, RepositoryError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.files).map_err(TrashInfoReadError::CantOpenDir)? {
            let entry = entry.map_err(|e| TrashInfoReadError::CantOpenDir(e))?;
            let name = entry.file_name();
            let name = match name.to_str() {
                Some(v) => v,
                None => continue,
            };

            let info_path = self.info.join(format!("{name}.trashinfo"));
            match InfoFile::read(&info_path, name) {
                Ok(mut item) => {
                    item.original_path = self.resolve_original_path(item.original_path);
                    out.push(item);
                }
                Err(e) => {
                    log::warn!("skipping unreadable trashinfo for '{name}': {e}");
                }
            }
        }
        Ok(out)
    }

    pub fn unlink(&self, trashname: &str) -> Result<(), RepositoryError> {
        let target = self.files.join(trashname);
        if target.exists() {
            widen_permissions(&target);
            remove_recursive(&target, false).map_err(|e| RepositoryError::CanNotUnlinkFile {
                file: trashname.to_string(),
                reason: e.to_string(),
            })?;
        }

        let info = self.info.join(format!("{trashname}.trashinfo"));
        fs::remove_file(&info).map_err(|e| RepositoryError::CanNotUnlinkFile {
            file: trashname.to_string(),
            reason: e.to_string(),
        })
    }

    /// Overwrite every regular file under `files/<trashname>` with random
    /// bytes before removing it. Best-effort, not cryptographically secure.
    pub fn shred(&self, trashname: &str) -> Result<(), RepositoryError> {
        let target = self.files.join(trashname);
        if target.exists() {
            widen_permissions(&target);
            remove_recursive(&target, true).map_err(|e| RepositoryError::CanNotShredFile {
                file: trashname.to_string(),
                reason: e.to_string(),
            })?;
        }

        let info = self.info.join(format!("{trashname}.trashinfo"));
        fs::remove_file(&info).map_err(|e| RepositoryError::CanNotShredFile {
            file: trashname.to_string(),
            reason: e.to_string(),
        })
    }

    /// Restore `trashname` to its original location. If that location is
    /// currently occupied, `before_restore` is invoked first (default
    /// policy: trash the existing file again rather than silently
    /// overwrite it).
    pub fn restore(
        &self,
        trashname: &str,
        before_restore: impl FnOnce(&Path) -> Result<(), RepositoryError>,
    ) -> Result<PathBuf, RepositoryError> {
        let info_path = self.info.join(format!("{trashname}.trashinfo"));
        let item = InfoFile::read(&info_path, trashname)?;
        let original_path = self.resolve_original_path(item.original_path);

        if original_path.exists() {
            before_restore(&original_path)?;
        }

        let files_entry = self.files.join(trashname);
        RenameOnly
            .move_file(&files_entry, &original_path)
            .map_err(RepositoryError::Move)?;

        fs::remove_file(&info_path)?;
        Ok(original_path)
    }

    /// Twice: drop `info/` entries with no `files/` sibling, then drop
    /// `files/` entries with no `info/` sibling. A single orphan that can't
    /// be removed is logged and skipped rather than aborting the rest of
    /// the repair.
    pub fn cleanup(&self) -> Result<(), RepositoryError> {
        for entry in fs::read_dir(&self.info)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some(trashname) = name.strip_suffix(".trashinfo") else {
                continue;
            };
            if !self.files.join(trashname).exists() {
                if let Err(e) = fs::remove_file(entry.path()) {
                    report_cant_remove(&entry.path(), e);
                }
            }
        }

        for entry in fs::read_dir(&self.files)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy().into_owned();
            let info = self.info.join(format!("{name}.trashinfo"));
            if !info.exists() {
                let path = entry.path();
                let result = if path.is_dir() {
                    fs::remove_dir_all(&path)
                } else {
                    fs::remove_file(&path)
                };
                if let Err(e) = result {
                    report_cant_remove(&path, e);
                }
            }
        }

        Ok(())
    }
}

fn report_cant_remove(path: &Path, source: std::io::Error) {
    let err = RepositoryError::CantRemoveFile {
        file: path.display().to_string(),
        reason: source.to_string(),
    };
    log::warn!("cleanup: {err}");
}

fn ensure_dir_mode(path: &Path, attrs: &dyn DirectoryAttributes) -> Result<(), RepositoryError> {
    match path.try_exists() {
        Ok(true) => {
            let mode = path.metadata()?.permissions().mode() & 0o777;
            if !attrs.check(mode) {
                return Err(RepositoryError::TrashDirectoryMode {
                    directory: path.to_path_buf(),
                    mode,
                });
            }
            Ok(())
        }
        Ok(false) => {
            fs::create_dir_all(path)
                .map_err(|_| RepositoryError::CantMakeDirectory(path.to_path_buf()))?;
            fs::set_permissions(path, fs::Permissions::from_mode(attrs.mode()))
                .map_err(|_| RepositoryError::CantMakeDirectory(path.to_path_buf()))
        }
        Err(_) => Err(RepositoryError::CantMakeDirectory(path.to_path_buf())),
    }
}

fn widen_permissions(path: &Path) {
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o777));
}

fn remove_recursive(path: &Path, shred: bool) -> std::io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        widen_permissions(path);
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            remove_recursive(&entry.path(), shred)?;
        }
        fs::remove_dir(path)
    } else if shred && meta.file_type().is_file() {
        shred_file(path)?;
        fs::remove_file(path)
    } else {
        fs::remove_file(path)
    }
}

fn shred_file(path: &Path) -> std::io::Result<()> {
    let size = fs::metadata(path)?.len();
    let mut f = OpenOptions::new().write(true).open(path)?;
    let mut rng = rand::thread_rng();
    let mut buf = vec![0u8; size.min(1 << 20) as usize];
    let mut remaining = size;
    while remaining > 0 {
        let chunk = remaining.min(buf.len() as u64) as usize;
        rng.fill_bytes(&mut buf[..chunk]);
        f.write_all(&buf[..chunk])?;
        remaining -= chunk as u64;
    }
    f.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::create_dir_all;
    use std::time::SystemTime;

    fn temp_base(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("trash-rs-repo-test-{name}-{nanos}"));
        create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn add_then_list_then_restore_round_trip() {
        let base = temp_base("roundtrip");
        let repo = PhysicalRepository::new(Box::new(HomeAttributes), &base, true).unwrap();

        let src = base.join("a.txt");
        fs::write(&src, b"hello\n").unwrap();

        let trashname = repo.add(&src, src.to_str().unwrap(), &RenameOnly).unwrap();
        assert_eq!(trashname, "a.txt");
        assert!(!src.exists());

        let items = repo.items().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].trashname, "a.txt");
        assert_eq!(items[0].original_path, src);

        let restored = repo
            .restore(&trashname, |_| Ok(()))
            .unwrap();
        assert_eq!(restored, src);
        assert_eq!(fs::read(&src).unwrap(), b"hello\n");
        assert!(!repo.files.join("a.txt").exists());
        assert!(!repo.info.join("a.txt.trashinfo").exists());
    }

    #[test]
    fn colliding_basenames_get_numbered_suffixes() {
        let base = temp_base("collision");
        let repo = PhysicalRepository::new(Box::new(HomeAttributes), &base, true).unwrap();

        let src = base.join("f");
        fs::write(&src, b"a").unwrap();
        let first = repo.add(&src, "f", &RenameOnly).unwrap();
        assert_eq!(first, "f");

        fs::write(&src, b"b").unwrap();
        let second = repo.add(&src, "f", &RenameOnly).unwrap();
        assert_eq!(second, "f.1");

        let restored = repo.restore(&second, |_| Ok(())).unwrap();
        assert_eq!(fs::read(&restored).unwrap(), b"b");
    }

    #[test]
    fn cleanup_restores_bijection() {
        let base = temp_base("cleanup");
        let repo = PhysicalRepository::new(Box::new(HomeAttributes), &base, true).unwrap();

        fs::write(repo.files.join("a"), b"x").unwrap();
        fs::write(repo.files.join("b"), b"y").unwrap();
        InfoFile::write(
            &repo.info.join("a.trashinfo"),
            "/tmp/a",
            Local::now().naive_local(),
        )
        .unwrap();
        InfoFile::write(
            &repo.info.join("c.trashinfo"),
            "/tmp/c",
            Local::now().naive_local(),
        )
        .unwrap();

        repo.cleanup().unwrap();

        assert!(repo.files.join("a").exists());
        assert!(repo.info.join("a.trashinfo").exists());
        assert!(!repo.files.join("b").exists());
        assert!(!repo.info.join("c.trashinfo").exists());
    }

    #[test]
    fn shred_overwrites_then_removes() {
        let base = temp_base("shred");
        let repo = PhysicalRepository::new(Box::new(HomeAttributes), &base, true).unwrap();

        let src = base.join("secret.txt");
        fs::write(&src, b"sensitive data").unwrap();
        let trashname = repo.add(&src, "secret.txt", &RenameOnly).unwrap();

        repo.shred(&trashname).unwrap();
        assert!(!repo.files.join(&trashname).exists());
        assert!(!repo.info.join(format!("{trashname}.trashinfo")).exists());
    }

    #[test]
    fn non_home_repository_rejoins_relative_path_on_list_and_restore() {
        let base = temp_base("nonhome");
        let repo = PhysicalRepository::new(Box::new(TopAttributes), &base, false).unwrap();

        let src = base.join("sub").join("x.txt");
        fs::create_dir_all(src.parent().unwrap()).unwrap();
        fs::write(&src, b"data").unwrap();

        // non-home callers pass a mount-relative key, as the Router does.
        let relative_key = "sub/x.txt";
        let trashname = repo.add(&src, relative_key, &RenameOnly).unwrap();

        let items = repo.items().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].original_path, src);

        let restored = repo.restore(&trashname, |_| Ok(())).unwrap();
        assert_eq!(restored, src);
        assert_eq!(fs::read(&src).unwrap(), b"data");
    }

    #[test]
    fn trashing_a_directory_records_a_directorysizes_entry() {
        let base = temp_base("dirsizes");
        let repo = PhysicalRepository::new(Box::new(HomeAttributes), &base, true).unwrap();

        let src = base.join("a_dir");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("inside"), b"some bytes").unwrap();

        let trashname = repo.add(&src, "a_dir", &RenameOnly).unwrap();

        let entries = fs::read_to_string(repo.base.join("directorysizes")).unwrap();
        assert_eq!(entries.lines().count(), 1);
        assert!(entries.contains(&trashname));
    }
}
