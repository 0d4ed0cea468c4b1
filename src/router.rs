//! Repository Router (C2) — maps a filename or trash key to the right
//! [`PhysicalRepository`] under a layered resolution order: a custom
//! mapping, then the home repository, then every known non-home repository,
//! then a device-top fallback, then a last-resort home attempt.

use std::collections::HashMap;
use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::device::device_top_directory;
use crate::error::{RepositoryError, RouterError};
use crate::repository::{
    HomeAttributes, Mover, PhysicalRepository, RenameOnly, TopAttributes, TrashItem, TryAnything,
};
use crate::util::to_abs_path;

/// A routable identifier for a trashed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrashKey {
    Home(String),
    Qualified { name: String, base: PathBuf },
}

/// Parses on the **first** `':'`; no colon means the home form.
pub fn parse_trash_key(s: &str) -> TrashKey {
    match s.split_once(':') {
        None => TrashKey::Home(s.to_string()),
        Some((name, base)) => TrashKey::Qualified {
            name: name.to_string(),
            base: PathBuf::from(base),
        },
    }
}

/// Which repository the Router actually used for a call — drives the Peer
/// Transport's rendezvous publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoUsage {
    Home,
    Top(PathBuf),
}

/// `{target_prefix → can_base}`, persisted as `can_base:target_prefix` lines.
#[derive(Debug, Default)]
pub struct CustomMapping {
    path: Option<PathBuf>,
    entries: Vec<(String, PathBuf)>,
    dirty: bool,
}

impl CustomMapping {
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let mut entries = Vec::new();
        if let Ok(contents) = fs::read_to_string(path) {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if let Some((can_base, target_prefix)) = line.split_once(':') {
                    entries.push((
                        strip_trailing_slash(target_prefix),
                        PathBuf::from(strip_trailing_slash(can_base)),
                    ));
                }
            }
        }

        Ok(CustomMapping {
            path: Some(path.to_path_buf()),
            entries,
            dirty: false,
        })
    }

    pub fn empty() -> Self {
        CustomMapping {
            path: None,
            entries: Vec::new(),
            dirty: false,
        }
    }

    /// First mapping (in file order) whose `target_prefix` is a strict
    /// prefix of `filename`.
    pub fn lookup(&self, filename: &str) -> Option<&Path> {
        self.entries
            .iter()
            .find(|(prefix, _)| !prefix.is_empty() && filename.starts_with(prefix.as_str()) && prefix.len() < filename.len())
            .map(|(_, base)| base.as_path())
    }

    pub fn insert(&mut self, can_base: PathBuf, target_prefix: String) {
        self.entries.push((strip_trailing_slash(&target_prefix), can_base));
        self.dirty = true;
    }
}

impl Drop for CustomMapping {
    fn drop(&mut self) {
        if !self.dirty {
            return;
        }
        let Some(path) = &self.path else { return };
        if let Ok(mut f) = File::create(path) {
            for (prefix, base) in &self.entries {
                let _ = writeln!(f, "{}:{}", base.display(), prefix);
            }
        }
    }
}

fn strip_trailing_slash(s: &str) -> String {
    s.trim_end_matches('/').to_string()
}

/// Ordered list of known non-home trash bases.
#[derive(Debug, Default)]
pub struct DirectoryList {
    path: Option<PathBuf>,
    bases: Vec<PathBuf>,
    dirty: bool,
}

impl DirectoryList {
    pub fn load(path: &Path) -> Self {
        let mut bases = Vec::new();
        if let Ok(contents) = fs::read_to_string(path) {
            for line in contents.lines() {
                let line = line.trim();
                if !line.is_empty() {
                    bases.push(PathBuf::from(line));
                }
            }
        }

        DirectoryList {
            path: Some(path.to_path_buf()),
            bases,
            dirty: false,
        }
    }

    pub fn empty() -> Self {
        DirectoryList {
            path: None,
            bases: Vec::new(),
            dirty: false,
        }
    }

    pub fn bases(&self) -> &[PathBuf] {
        &self.bases
    }

    /// Appends `base` if it's not already known. Persisted on drop.
    pub fn remember(&mut self, base: PathBuf) {
        if !self.bases.contains(&base) {
            self.bases.push(base);
            self.dirty = true;
        }
    }
}

impl Drop for DirectoryList {
    fn drop(&mut self) {
        if !self.dirty {
            return;
        }
        let Some(path) = &self.path else { return };
        if let Ok(mut f) = File::create(path) {
            for base in &self.bases {
                let _ = writeln!(f, "{}", base.display());
            }
        }
    }
}

fn resolve_home_base() -> Result<PathBuf, RouterError> {
    if let Ok(v) = env::var("XDG_DATA_HOME") {
        if !v.is_empty() {
            return Ok(PathBuf::from(v));
        }
    }
    if let Ok(v) = env::var("HOME") {
        if !v.is_empty() {
            return Ok(PathBuf::from(v).join(".local").join("share"));
        }
    }
    Err(RouterError::NoUsefulHomeEnv)
}

/// Routes requests to one of potentially many [`PhysicalRepository`]
/// instances, lazily constructed and cached by base directory. Thread-safe:
/// the repository cache and directory list are mutex-guarded so the
/// Scheduler's workers and a UI thread can share one Router.
pub struct Router {
    home_base: PathBuf,
    custom: Mutex<CustomMapping>,
    list: Mutex<DirectoryList>,
    repos: Mutex<HashMap<PathBuf, Arc<PhysicalRepository>>>,
    usage: Box<dyn Fn(RepoUsage) + Send + Sync>,
}

impl Router {
    pub fn new(custom: CustomMapping, list: DirectoryList) -> Result<Self, RouterError> {
        Ok(Router {
            home_base: resolve_home_base()?,
            custom: Mutex::new(custom),
            list: Mutex::new(list),
            repos: Mutex::new(HashMap::new()),
            usage: Box::new(|_| {}),
        })
    }

    pub fn with_usage_callback(mut self, cb: impl Fn(RepoUsage) + Send + Sync + 'static) -> Self {
        self.usage = Box::new(cb);
        self
    }

    fn home_repo(&self) -> Result<Arc<PhysicalRepository>, RepositoryError> {
        self.repo_for(&self.home_base, true)
    }

    fn top_repo(&self, base: &Path) -> Result<Arc<PhysicalRepository>, RepositoryError> {
        self.repo_for(base, false)
    }

    fn repo_for(&self, base: &Path, is_home: bool) -> Result<Arc<PhysicalRepository>, RepositoryError> {
        let mut cache = self.repos.lock().unwrap();
        if let Some(existing) = cache.get(base) {
            return Ok(Arc::clone(existing));
        }

        let attrs: Box<dyn crate::repository::DirectoryAttributes> = if is_home {
            Box::new(HomeAttributes)
        } else {
            Box::new(TopAttributes)
        };
        let repo = Arc::new(PhysicalRepository::new(attrs, base, is_home)?);
        cache.insert(base.to_path_buf(), Arc::clone(&repo));
        Ok(repo)
    }

    /// `Path=` key for a file being added: absolute for the home repository,
    /// relative to the repository's mount point otherwise.
    fn path_key(abs_path: &Path, base: &Path, is_home: bool) -> String {
        if is_home {
            return abs_path.to_string_lossy().into_owned();
        }
        abs_path
            .strip_prefix(base)
            .unwrap_or(abs_path)
            .to_string_lossy()
            .into_owned()
    }

    /// Layered `add` resolution.
    pub fn add(&self, path: impl AsRef<Path>) -> Result<(String, RepoUsage), RouterError> {
        let abs_path = to_abs_path(path.as_ref()).map_err(|_| {
            RouterError::NoDirectoryForTarget(path.as_ref().display().to_string())
        })?;
        let filename = abs_path.to_string_lossy().into_owned();

        // 1. custom mapping
        let custom_base = self.custom.lock().unwrap().lookup(&filename).map(Path::to_path_buf);
        if let Some(base) = custom_base {
            match self.try_add(&abs_path, &base, false, &RenameOnly) {
                Ok(name) => return Ok((name, RepoUsage::Top(base))),
                Err(RepositoryError::Move(crate::error::MoveError::NonRenamable { .. })) => {}
                Err(e) => return Err(e.into()),
            }
        }

        // 2. home repository
        match self.try_add(&abs_path, &self.home_base.clone(), true, &RenameOnly) {
            Ok(name) => return Ok((name, RepoUsage::Home)),
            Err(RepositoryError::Move(crate::error::MoveError::NonRenamable { .. })) => {}
            Err(e) => return Err(e.into()),
        }

        // 3. known list
        let known_bases = self.list.lock().unwrap().bases().to_vec();
        for base in &known_bases {
            if let Ok(name) = self.try_add(&abs_path, base, false, &RenameOnly) {
                return Ok((name, RepoUsage::Top(base.clone())));
            }
        }

        // 4. device-top fallback
        if let Ok(top) = device_top_directory(&abs_path) {
            if !known_bases.contains(&top) {
                self.list.lock().unwrap().remember(top.clone());
            }
            if let Ok(name) = self.try_add(&abs_path, &top, false, &TryAnything) {
                return Ok((name, RepoUsage::Top(top)));
            }
        }

        // 5. home try-anything
        if let Ok(name) = self.try_add(&abs_path, &self.home_base.clone(), true, &TryAnything) {
            return Ok((name, RepoUsage::Home));
        }

        Err(RouterError::NoDirectoryForTarget(filename))
    }

    fn try_add(
        &self,
        abs_path: &Path,
        base: &Path,
        is_home: bool,
        mover: &dyn Mover,
    ) -> Result<String, RepositoryError> {
        let repo = self.repo_for(base, is_home)?;
        let key = Self::path_key(abs_path, base, is_home);
        let name = repo.add(abs_path, &key, mover)?;
        let usage = if is_home {
            RepoUsage::Home
        } else {
            RepoUsage::Top(base.to_path_buf())
        };
        (self.usage)(usage);
        Ok(name)
    }

    fn repo_for_key(&self, key: &TrashKey) -> Result<(Arc<PhysicalRepository>, RepoUsage), RouterError> {
        if Self::trashname_of(key).is_empty() {
            return Err(RouterError::InvalidTrashNameFormat(format!("{key:?}")));
        }
        match key {
            TrashKey::Home(_) => Ok((self.home_repo()?, RepoUsage::Home)),
            TrashKey::Qualified { base, .. } => {
                Ok((self.top_repo(base)?, RepoUsage::Top(base.clone())))
            }
        }
    }

    fn trashname_of(key: &TrashKey) -> &str {
        match key {
            TrashKey::Home(name) => name,
            TrashKey::Qualified { name, .. } => name,
        }
    }

    pub fn unlink(&self, key: &TrashKey) -> Result<RepoUsage, RouterError> {
        let (repo, usage) = self.repo_for_key(key)?;
        repo.unlink(Self::trashname_of(key))?;
        (self.usage)(usage.clone());
        Ok(usage)
    }

    pub fn shred(&self, key: &TrashKey) -> Result<RepoUsage, RouterError> {
        let (repo, usage) = self.repo_for_key(key)?;
        repo.shred(Self::trashname_of(key))?;
        (self.usage)(usage.clone());
        Ok(usage)
    }

    pub fn restore(&self, key: &TrashKey) -> Result<(PathBuf, RepoUsage), RouterError> {
        let (repo, usage) = self.repo_for_key(key)?;
        let restored = repo.restore(Self::trashname_of(key), |existing| {
            // default before-restore policy: trash the occupant again
            // rather than silently overwrite it.
            self.add(existing).map(|_| ()).map_err(|e| match e {
                RouterError::Repository(re) => re,
                other => RepositoryError::NoSuchTrashItem(other.to_string()),
            })
        })?;
        (self.usage)(usage.clone());
        Ok((restored, usage))
    }

    /// Items visible through a single key's repository. Non-home entries get
    /// their raw trashname prefixed with `:<base>` so they round-trip back
    /// through `parse_trash_key`.
    pub fn items(&self, key: &TrashKey) -> Result<Vec<TrashItem>, RouterError> {
        let (repo, usage) = self.repo_for_key(key)?;
        let items = repo.items()?;
        (self.usage)(usage.clone());
        Ok(translate_items(items, &usage))
    }

    /// All items across the home repository and every known base,
    /// error-isolated per repository.
    pub fn all_items(&self) -> Vec<TrashItem> {
        let mut out = Vec::new();

        match self.home_repo().and_then(|r| Ok(r.items()?)) {
            Ok(items) => out.extend(translate_items(items, &RepoUsage::Home)),
            Err(e) => log::warn!("home repository items() failed: {e}"),
        }

        let known_bases = self.list.lock().unwrap().bases().to_vec();
        for base in known_bases {
            match self.top_repo(&base).and_then(|r| Ok(r.items()?)) {
                Ok(items) => out.extend(translate_items(items, &RepoUsage::Top(base))),
                Err(e) => log::warn!("repository at '{}' items() failed: {e}", base.display()),
            }
        }

        out
    }

    /// Broadcast cleanup to the home repository and every known base,
    /// error-isolated.
    pub fn cleanup_all(&self) {
        if let Err(e) = self.home_repo().and_then(|r| Ok(r.cleanup()?)) {
            log::warn!("home repository cleanup() failed: {e}");
        }

        let known_bases = self.list.lock().unwrap().bases().to_vec();
        for base in known_bases {
            if let Err(e) = self.top_repo(&base).and_then(|r| Ok(r.cleanup()?)) {
                log::warn!("repository at '{}' cleanup() failed: {e}", base.display());
            }
        }
    }

    pub fn home_base(&self) -> &Path {
        &self.home_base
    }

    pub fn known_bases(&self) -> Vec<PathBuf> {
        self.list.lock().unwrap().bases().to_vec()
    }
}

fn translate_items(items: Vec<TrashItem>, usage: &RepoUsage) -> Vec<TrashItem> {
    match usage {
        RepoUsage::Home => items,
        RepoUsage::Top(base) => items
            .into_iter()
            .map(|mut item| {
                item.trashname = format!("{}:{}", item.trashname, base.display());
                item
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_parser_splits_on_first_colon() {
        assert_eq!(parse_trash_key("foo"), TrashKey::Home("foo".to_string()));
        assert_eq!(
            parse_trash_key("foo:/tmp/vol"),
            TrashKey::Qualified {
                name: "foo".to_string(),
                base: PathBuf::from("/tmp/vol"),
            }
        );
        assert_eq!(
            parse_trash_key(":/tmp"),
            TrashKey::Qualified {
                name: String::new(),
                base: PathBuf::from("/tmp"),
            }
        );
        assert_eq!(
            parse_trash_key("a:b:c"),
            TrashKey::Qualified {
                name: "a".to_string(),
                base: PathBuf::from("b:c"),
            }
        );
    }

    #[test]
    fn custom_mapping_prefix_lookup() {
        let mut mapping = CustomMapping::empty();
        mapping.insert(PathBuf::from("/mnt/archive"), "/home/user/downloads".to_string());

        assert_eq!(
            mapping.lookup("/home/user/downloads/movie.mp4"),
            Some(Path::new("/mnt/archive"))
        );
        assert_eq!(mapping.lookup("/home/user/other/file"), None);
        // exact match (prefix length == filename length) is excluded.
        assert_eq!(mapping.lookup("/home/user/downloads"), None);
    }

    #[test]
    fn directory_list_remember_is_idempotent() {
        let mut list = DirectoryList::empty();
        list.remember(PathBuf::from("/mnt/a"));
        list.remember(PathBuf::from("/mnt/a"));
        list.remember(PathBuf::from("/mnt/b"));
        assert_eq!(list.bases(), &[PathBuf::from("/mnt/a"), PathBuf::from("/mnt/b")]);
    }
}
