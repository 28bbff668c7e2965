use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

impl Whence {
    pub fn from_code(code: i32) -> Whence {
        match code {
            1 => Whence::Current,
            2 => Whence::End,
            _ => Whence::Start,
        }
    }
}

/// ## File system collaborator
///
/// Path-keyed byte storage behind small numeric handles. Handle 0 is
/// never issued so programs can test `fopen` against zero.
pub trait FileSystem {
    fn open(&mut self, path: &str, mode: &str) -> Option<u8>;
    fn close(&mut self, handle: u8) -> bool;
    fn read(&mut self, handle: u8, buf: &mut [u8]) -> Option<usize>;
    fn write(&mut self, handle: u8, data: &[u8]) -> Option<usize>;
    fn seek(&mut self, handle: u8, offset: i32, whence: Whence) -> Option<u32>;
    fn tell(&self, handle: u8) -> Option<u32>;
    fn eof(&self, handle: u8) -> Option<bool>;
    fn delete(&mut self, path: &str) -> bool;
}

#[derive(Debug)]
struct OpenFile {
    path: String,
    pos: usize,
    readable: bool,
    writable: bool,
    append: bool,
}

/// In-memory file system, optionally backed by a host directory:
/// files load from the root on first open and write back on close.
#[derive(Debug, Default)]
pub struct MemoryFs {
    root: Option<PathBuf>,
    files: BTreeMap<String, Vec<u8>>,
    open: HashMap<u8, OpenFile>,
}

impl MemoryFs {
    pub fn new() -> MemoryFs {
        MemoryFs::default()
    }

    pub fn rooted(root: impl Into<PathBuf>) -> MemoryFs {
        MemoryFs {
            root: Some(root.into()),
            ..MemoryFs::default()
        }
    }

    pub fn insert(&mut self, path: &str, data: &[u8]) {
        self.files.insert(path.to_string(), data.to_vec());
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(|v| v.as_slice())
    }

    fn host_path(&self, path: &str) -> Option<PathBuf> {
        self.root
            .as_ref()
            .map(|root| root.join(path.trim_start_matches('/')))
    }

    fn load(&mut self, path: &str) -> bool {
        if self.files.contains_key(path) {
            return true;
        }
        if let Some(host) = self.host_path(path) {
            if let Ok(data) = std::fs::read(&host) {
                self.files.insert(path.to_string(), data);
                return true;
            }
        }
        false
    }

    fn free_handle(&self) -> Option<u8> {
        (1..=u8::MAX).find(|h| !self.open.contains_key(h))
    }
}

impl FileSystem for MemoryFs {
    fn open(&mut self, path: &str, mode: &str) -> Option<u8> {
        let plus = mode.contains('+');
        let (readable, writable, append) = match mode.chars().next()? {
            'r' => (true, plus, false),
            'w' => (plus, true, false),
            'a' => (plus, true, true),
            _ => return None,
        };
        let exists = self.load(path);
        if mode.starts_with('r') && !exists {
            return None;
        }
        let handle = self.free_handle()?;
        if mode.starts_with('w') || !exists {
            self.files.insert(path.to_string(), vec![]);
        }
        let pos = if append {
            self.files.get(path).map_or(0, |f| f.len())
        } else {
            0
        };
        self.open.insert(
            handle,
            OpenFile {
                path: path.to_string(),
                pos,
                readable,
                writable,
                append,
            },
        );
        tracing::debug!(path, handle, mode, "open");
        Some(handle)
    }

    fn close(&mut self, handle: u8) -> bool {
        let file = match self.open.remove(&handle) {
            Some(file) => file,
            None => return false,
        };
        if file.writable {
            if let (Some(host), Some(data)) = (self.host_path(&file.path), self.files.get(&file.path))
            {
                if let Err(error) = std::fs::write(&host, data) {
                    tracing::warn!(path = %host.display(), %error, "write back failed");
                }
            }
        }
        true
    }

    fn read(&mut self, handle: u8, buf: &mut [u8]) -> Option<usize> {
        let file = self.open.get_mut(&handle)?;
        if !file.readable {
            return None;
        }
        let data = self.files.get(&file.path)?;
        let start = file.pos.min(data.len());
        let len = buf.len().min(data.len() - start);
        buf[..len].copy_from_slice(&data[start..start + len]);
        file.pos = start + len;
        Some(len)
    }

    fn write(&mut self, handle: u8, bytes: &[u8]) -> Option<usize> {
        let file = self.open.get_mut(&handle)?;
        if !file.writable {
            return None;
        }
        let data = self.files.get_mut(&file.path)?;
        if file.append {
            file.pos = data.len();
        }
        let end = file.pos + bytes.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[file.pos..end].copy_from_slice(bytes);
        file.pos = end;
        Some(bytes.len())
    }

    fn seek(&mut self, handle: u8, offset: i32, whence: Whence) -> Option<u32> {
        let file = self.open.get_mut(&handle)?;
        let len = self.files.get(&file.path).map_or(0, |d| d.len()) as i64;
        let origin = match whence {
            Whence::Start => 0,
            Whence::Current => file.pos as i64,
            Whence::End => len,
        };
        let pos = origin + i64::from(offset);
        if pos < 0 {
            return None;
        }
        file.pos = pos as usize;
        Some(pos as u32)
    }

    fn tell(&self, handle: u8) -> Option<u32> {
        self.open.get(&handle).map(|f| f.pos as u32)
    }

    fn eof(&self, handle: u8) -> Option<bool> {
        let file = self.open.get(&handle)?;
        let len = self.files.get(&file.path).map_or(0, |d| d.len());
        Some(file.pos >= len)
    }

    fn delete(&mut self, path: &str) -> bool {
        if self.open.values().any(|f| f.path == path) {
            return false;
        }
        let mut removed = self.files.remove(path).is_some();
        if let Some(host) = self.host_path(path) {
            removed |= std::fs::remove_file(host).is_ok();
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let mut fs = MemoryFs::new();
        let h = fs.open("save.dat", "w+").unwrap();
        assert_ne!(h, 0);
        assert_eq!(fs.write(h, b"hello"), Some(5));
        assert_eq!(fs.tell(h), Some(5));
        assert_eq!(fs.eof(h), Some(true));
        assert_eq!(fs.seek(h, 1, Whence::Start), Some(1));
        let mut buf = [0u8; 8];
        assert_eq!(fs.read(h, &mut buf), Some(4));
        assert_eq!(&buf[..4], b"ello");
        assert!(fs.close(h));
        assert_eq!(fs.get("save.dat"), Some(&b"hello"[..]));
    }

    #[test]
    fn test_read_missing_fails() {
        let mut fs = MemoryFs::new();
        assert_eq!(fs.open("nothing", "r"), None);
    }

    #[test]
    fn test_append_mode() {
        let mut fs = MemoryFs::new();
        fs.insert("log", b"ab");
        let h = fs.open("log", "a").unwrap();
        fs.write(h, b"c").unwrap();
        fs.close(h);
        assert_eq!(fs.get("log"), Some(&b"abc"[..]));
    }

    #[test]
    fn test_delete_refuses_open_file() {
        let mut fs = MemoryFs::new();
        fs.insert("x", b"1");
        let h = fs.open("x", "r").unwrap();
        assert!(!fs.delete("x"));
        fs.close(h);
        assert!(fs.delete("x"));
        assert!(!fs.delete("x"));
    }

    #[test]
    fn test_write_only_cannot_read() {
        let mut fs = MemoryFs::new();
        let h = fs.open("w", "w").unwrap();
        assert_eq!(fs.read(h, &mut [0u8; 1]), None);
    }
}
