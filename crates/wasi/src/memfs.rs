//! A small in-memory [`FileSystem`] for tests and self-contained
//! embeddings.
//!
//! Nodes are keyed by canonical absolute path. The semantics the
//! host-call layer depends on are faithful: missing parent directories
//! fail opens with [`FsError::DoesNotExist`] even in creating modes,
//! exclusive creation fails on existing files, and directory removal
//! requires emptiness.

use crate::fs::{
    AccessMode,
    CreateMode,
    DirEnt,
    DirStream,
    FileInfo,
    FileSystem,
    FsError,
    SyncKind,
    Vfd,
    VfdFlags,
};
use crate::types::{Filetype, Timestamp, Whence};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Arc<Mutex<Vec<u8>>>),
    Symlink(String),
}

#[derive(Debug, Default)]
struct Inner {
    nodes: BTreeMap<String, Node>,
    times: BTreeMap<String, (Timestamp, Timestamp)>,
    next_file_id: u64,
    file_ids: BTreeMap<String, u64>,
}

/// An in-memory filesystem rooted at `/`.
#[derive(Debug)]
pub struct MemFs {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFs {
    /// Creates an empty filesystem containing only the root directory.
    pub fn new() -> Self {
        let mut inner = Inner::default();
        inner.nodes.insert("/".to_string(), Node::Dir);
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("memfs lock")
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(index) => &path[..index],
        None => "/",
    }
}

impl Inner {
    fn require_parent_dir(&self, path: &str) -> Result<(), FsError> {
        match self.nodes.get(parent_of(path)) {
            Some(Node::Dir) => Ok(()),
            Some(_) => Err(FsError::IsNotDirectory),
            None => Err(FsError::DoesNotExist),
        }
    }

    fn file_id(&mut self, path: &str) -> u64 {
        if let Some(id) = self.file_ids.get(path) {
            return *id;
        }
        self.next_file_id += 1;
        let id = self.next_file_id;
        self.file_ids.insert(path.to_string(), id);
        id
    }

    fn info(&mut self, path: &str) -> Result<FileInfo, FsError> {
        let node = self.nodes.get(path).ok_or(FsError::DoesNotExist)?.clone();
        let (atime, mtime) = self.times.get(path).copied().unwrap_or((0, 0));
        let (file_type, num_bytes) = match node {
            Node::Dir => (Filetype::Directory, 0),
            Node::File(data) => {
                let len = data.lock().expect("memfs file lock").len() as u64;
                (Filetype::RegularFile, len)
            }
            Node::Symlink(target) => (Filetype::SymbolicLink, target.len() as u64),
        };
        Ok(FileInfo {
            device: 1,
            file_id: self.file_id(path),
            file_type: Some(file_type),
            num_links: 1,
            num_bytes,
            last_access_time: atime,
            last_write_time: mtime,
        })
    }
}

/// An open handle into a [`MemFs`].
struct MemVfd {
    fs: Arc<Mutex<Inner>>,
    path: String,
    node: Node,
    access: AccessMode,
    cursor: Mutex<u64>,
    flags: Mutex<VfdFlags>,
}

impl MemVfd {
    fn data(&self) -> Result<&Arc<Mutex<Vec<u8>>>, FsError> {
        match &self.node {
            Node::File(data) => Ok(data),
            Node::Dir => Err(FsError::IsDirectory),
            Node::Symlink(_) => Err(FsError::DoesNotExist),
        }
    }

    fn readable(&self) -> Result<(), FsError> {
        match self.access {
            AccessMode::Read | AccessMode::ReadWrite => Ok(()),
            _ => Err(FsError::NotPermitted),
        }
    }

    fn writable(&self) -> Result<(), FsError> {
        match self.access {
            AccessMode::Write | AccessMode::ReadWrite => Ok(()),
            _ => Err(FsError::NotPermitted),
        }
    }
}

impl Vfd for MemVfd {
    fn read(&self, buffer: &mut [u8]) -> Result<usize, FsError> {
        self.readable()?;
        let mut cursor = self.cursor.lock().expect("cursor lock");
        let count = self.read_at(*cursor, buffer)?;
        *cursor += count as u64;
        Ok(count)
    }

    fn write(&self, buffer: &[u8]) -> Result<usize, FsError> {
        self.writable()?;
        let mut cursor = self.cursor.lock().expect("cursor lock");
        let offset = if self.flags.lock().expect("flags lock").append {
            self.data()?.lock().expect("memfs file lock").len() as u64
        } else {
            *cursor
        };
        let count = self.write_at(offset, buffer)?;
        *cursor = offset + count as u64;
        Ok(count)
    }

    fn read_at(&self, offset: u64, buffer: &mut [u8]) -> Result<usize, FsError> {
        self.readable()?;
        let data = self.data()?.lock().expect("memfs file lock");
        let offset = (offset as usize).min(data.len());
        let count = buffer.len().min(data.len() - offset);
        buffer[..count].copy_from_slice(&data[offset..offset + count]);
        Ok(count)
    }

    fn write_at(&self, offset: u64, buffer: &[u8]) -> Result<usize, FsError> {
        self.writable()?;
        let mut data = self.data()?.lock().expect("memfs file lock");
        let end = offset as usize + buffer.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[offset as usize..end].copy_from_slice(buffer);
        Ok(buffer.len())
    }

    fn seek(&self, offset: i64, whence: Option<Whence>) -> Result<u64, FsError> {
        let len = self.data()?.lock().expect("memfs file lock").len() as i64;
        let mut cursor = self.cursor.lock().expect("cursor lock");
        let base = match whence.unwrap_or(Whence::Set) {
            Whence::Set => 0,
            Whence::Cur => *cursor as i64,
            Whence::End => len,
        };
        let target = base.checked_add(offset).ok_or(FsError::InvalidOffset)?;
        if target < 0 {
            return Err(FsError::InvalidOffset);
        }
        *cursor = target as u64;
        Ok(*cursor)
    }

    fn sync(&self, _kind: SyncKind) -> Result<(), FsError> {
        Ok(())
    }

    fn set_flags(&self, flags: VfdFlags) -> Result<(), FsError> {
        *self.flags.lock().expect("flags lock") = flags;
        Ok(())
    }

    fn flags(&self) -> VfdFlags {
        *self.flags.lock().expect("flags lock")
    }

    fn info(&self) -> Result<FileInfo, FsError> {
        self.fs.lock().expect("memfs lock").info(&self.path)
    }

    fn set_size(&self, size: u64) -> Result<(), FsError> {
        self.writable()?;
        let mut data = self.data()?.lock().expect("memfs file lock");
        data.resize(size as usize, 0);
        Ok(())
    }

    fn set_times(&self, atime: Option<Timestamp>, mtime: Option<Timestamp>) -> Result<(), FsError> {
        let mut inner = self.fs.lock().expect("memfs lock");
        let entry = inner.times.entry(self.path.clone()).or_insert((0, 0));
        if let Some(atime) = atime {
            entry.0 = atime;
        }
        if let Some(mtime) = mtime {
            entry.1 = mtime;
        }
        Ok(())
    }

    fn open_dir(&self) -> Result<Box<dyn DirStream>, FsError> {
        if !matches!(self.node, Node::Dir) {
            return Err(FsError::IsNotDirectory);
        }
        let inner = self.fs.lock().expect("memfs lock");
        let prefix = if self.path == "/" {
            "/".to_string()
        } else {
            format!("{}/", self.path)
        };
        let mut entries: Vec<DirEnt> = Vec::new();
        let paths: Vec<(String, Node)> = inner
            .nodes
            .iter()
            .filter(|(path, _)| {
                path.starts_with(&prefix)
                    && path.len() > prefix.len()
                    && !path[prefix.len()..].contains('/')
            })
            .map(|(path, node)| (path.clone(), node.clone()))
            .collect();
        drop(inner);
        let mut inner = self.fs.lock().expect("memfs lock");
        for (path, node) in paths {
            let name = path[prefix.len()..].to_string();
            let file_type = match node {
                Node::Dir => Filetype::Directory,
                Node::File(_) => Filetype::RegularFile,
                Node::Symlink(_) => Filetype::SymbolicLink,
            };
            let file_id = inner.file_id(&path);
            entries.push(DirEnt {
                name,
                file_type,
                file_id,
            });
        }
        Ok(Box::new(MemDirStream { entries, cursor: 0 }))
    }
}

struct MemDirStream {
    entries: Vec<DirEnt>,
    cursor: usize,
}

impl DirStream for MemDirStream {
    fn next_entry(&mut self) -> Result<Option<DirEnt>, FsError> {
        let entry = self.entries.get(self.cursor).cloned();
        if entry.is_some() {
            self.cursor += 1;
        }
        Ok(entry)
    }

    fn seek(&mut self, cookie: u64) -> Result<(), FsError> {
        if cookie as usize > self.entries.len() {
            return Err(FsError::InvalidOffset);
        }
        self.cursor = cookie as usize;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.cursor as u64
    }
}

impl FileSystem for MemFs {
    fn open(
        &self,
        path: &str,
        access: AccessMode,
        create: CreateMode,
        flags: VfdFlags,
    ) -> Result<Arc<dyn Vfd>, FsError> {
        let mut inner = self.lock();
        let existing = inner.nodes.get(path).cloned();
        let node = match (existing, create) {
            (Some(Node::Dir), CreateMode::OpenExisting | CreateMode::OpenAlways) => Node::Dir,
            (Some(Node::Dir), _) => return Err(FsError::IsDirectory),
            (Some(Node::File(_)), CreateMode::CreateNew) => return Err(FsError::AlreadyExists),
            (Some(Node::File(data)), CreateMode::CreateAlways | CreateMode::TruncateExisting) => {
                data.lock().expect("memfs file lock").clear();
                Node::File(data)
            }
            (Some(Node::File(data)), _) => Node::File(data),
            (Some(Node::Symlink(_)), _) => return Err(FsError::DoesNotExist),
            (None, CreateMode::OpenExisting | CreateMode::TruncateExisting) => {
                return Err(FsError::DoesNotExist)
            }
            (None, _) => {
                inner.require_parent_dir(path)?;
                let data = Arc::new(Mutex::new(Vec::new()));
                inner
                    .nodes
                    .insert(path.to_string(), Node::File(data.clone()));
                Node::File(data)
            }
        };
        Ok(Arc::new(MemVfd {
            fs: self.inner.clone(),
            path: path.to_string(),
            node,
            access,
            cursor: Mutex::new(0),
            flags: Mutex::new(flags),
        }))
    }

    fn file_info(&self, path: &str) -> Result<FileInfo, FsError> {
        self.lock().info(path)
    }

    fn set_file_times(
        &self,
        path: &str,
        atime: Option<Timestamp>,
        mtime: Option<Timestamp>,
    ) -> Result<(), FsError> {
        let mut inner = self.lock();
        if !inner.nodes.contains_key(path) {
            return Err(FsError::DoesNotExist);
        }
        let entry = inner.times.entry(path.to_string()).or_insert((0, 0));
        if let Some(atime) = atime {
            entry.0 = atime;
        }
        if let Some(mtime) = mtime {
            entry.1 = mtime;
        }
        Ok(())
    }

    fn unlink_file(&self, path: &str) -> Result<(), FsError> {
        let mut inner = self.lock();
        match inner.nodes.get(path) {
            Some(Node::Dir) => Err(FsError::IsDirectory),
            Some(_) => {
                inner.nodes.remove(path);
                Ok(())
            }
            None => Err(FsError::DoesNotExist),
        }
    }

    fn remove_dir(&self, path: &str) -> Result<(), FsError> {
        let mut inner = self.lock();
        match inner.nodes.get(path) {
            Some(Node::Dir) => {}
            Some(_) => return Err(FsError::IsNotDirectory),
            None => return Err(FsError::DoesNotExist),
        }
        let prefix = format!("{path}/");
        if inner.nodes.keys().any(|other| other.starts_with(&prefix)) {
            return Err(FsError::IsNotEmpty);
        }
        inner.nodes.remove(path);
        Ok(())
    }

    fn create_dir(&self, path: &str) -> Result<(), FsError> {
        let mut inner = self.lock();
        if inner.nodes.contains_key(path) {
            return Err(FsError::AlreadyExists);
        }
        inner.require_parent_dir(path)?;
        inner.nodes.insert(path.to_string(), Node::Dir);
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        let mut inner = self.lock();
        if !inner.nodes.contains_key(from) {
            return Err(FsError::DoesNotExist);
        }
        inner.require_parent_dir(to)?;
        let node = inner.nodes.remove(from).expect("checked above");
        inner.nodes.insert(to.to_string(), node);
        Ok(())
    }

    fn symlink(&self, target: &str, link: &str) -> Result<(), FsError> {
        let mut inner = self.lock();
        if inner.nodes.contains_key(link) {
            return Err(FsError::AlreadyExists);
        }
        inner.require_parent_dir(link)?;
        inner
            .nodes
            .insert(link.to_string(), Node::Symlink(target.to_string()));
        Ok(())
    }

    fn read_link(&self, path: &str) -> Result<String, FsError> {
        match self.lock().nodes.get(path) {
            Some(Node::Symlink(target)) => Ok(target.clone()),
            Some(_) => Err(FsError::InvalidOffset),
            None => Err(FsError::DoesNotExist),
        }
    }
}
