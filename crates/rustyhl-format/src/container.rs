//! Default storage backend: a single-file record-stream container.
//!
//! Layout: an 8-byte magic signature, a version byte, seven reserved
//! bytes, then length-framed records until EOF. Each record body is
//! followed by a CRC32 of the body. A record describes one entity:
//! path, kind, optional committed-type handle, wire type descriptor,
//! dimensions, flags and payload. Array payloads may be zlib-deflated.
//!
//! Updates append records; on open, the last record for a path wins.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use byteorder::{ByteOrder, LittleEndian};

use crate::compound::CompoundDescriptor;
use crate::descr::TypeDescr;
use crate::error::FormatError;
use crate::filters;
use crate::storage::{
    EntityInfo, EntityKind, EntityType, Storage, StorageError, TypeHandle,
};

/// Magic signature at offset 0.
pub const SIGNATURE: [u8; 8] = *b"\x89RHL\r\n\x1a\n";
/// Current container format version.
pub const VERSION: u8 = 1;

const HEADER_LEN: usize = 16;
const FLAG_DEFLATED: u8 = 0x01;

#[derive(Debug, Clone)]
struct Record {
    kind: EntityKind,
    named: Option<TypeHandle>,
    descr: TypeDescr,
    dims: Vec<u64>,
    flags: u8,
    raw_len: u64,
    /// Payload in stored form (deflated when FLAG_DEFLATED is set).
    payload: Vec<u8>,
}

/// A container file open for reading or writing.
#[derive(Debug)]
pub struct FileContainer {
    path: PathBuf,
    index: BTreeMap<String, Record>,
    committed: BTreeMap<u64, CompoundDescriptor>,
    pending: Vec<u8>,
    next_handle: u64,
    fresh: bool,
    header_written: bool,
    closed: bool,
}

impl FileContainer {
    /// Start a brand-new container. Nothing touches the filesystem
    /// until [`Storage::sync`]; a container dropped before its first
    /// sync leaves no file behind.
    pub fn create<P: Into<PathBuf>>(path: P) -> FileContainer {
        FileContainer {
            path: path.into(),
            index: BTreeMap::new(),
            committed: BTreeMap::new(),
            pending: Vec::new(),
            next_handle: 1,
            fresh: true,
            header_written: false,
            closed: false,
        }
    }

    /// Open an existing container and index its records.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<FileContainer, StorageError> {
        let path = path.into();
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(StorageError::Io(e)),
        };
        if data.len() < HEADER_LEN || data[..8] != SIGNATURE {
            return Err(FormatError::SignatureNotFound.into());
        }
        if data[8] != VERSION {
            return Err(FormatError::UnsupportedVersion(data[8]).into());
        }

        let mut container = FileContainer {
            path,
            index: BTreeMap::new(),
            committed: BTreeMap::new(),
            pending: Vec::new(),
            next_handle: 1,
            fresh: false,
            header_written: true,
            closed: false,
        };

        let mut pos = HEADER_LEN;
        while pos < data.len() {
            ensure_len(&data, pos, 4)?;
            let body_len = LittleEndian::read_u32(&data[pos..pos + 4]) as usize;
            pos += 4;
            ensure_len(&data, pos, body_len + 4)?;
            let body = &data[pos..pos + body_len];
            let stored = LittleEndian::read_u32(&data[pos + body_len..pos + body_len + 4]);
            let computed = crc32fast::hash(body);
            if stored != computed {
                return Err(FormatError::ChecksumMismatch {
                    expected: stored,
                    computed,
                }
                .into());
            }
            pos += body_len + 4;
            let (record_path, record) = parse_record_body(body)?;
            if record.kind == EntityKind::NamedType {
                if let (Some(handle), TypeDescr::Compound(descr)) =
                    (record.named, &record.descr)
                {
                    container.committed.insert(handle.0, descr.clone());
                    if handle.0 >= container.next_handle {
                        container.next_handle = handle.0 + 1;
                    }
                }
            }
            container.index.insert(record_path, record);
        }
        Ok(container)
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.closed {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }

    fn append_record(&mut self, path: &str, record: Record) -> Result<(), StorageError> {
        let body = serialize_record_body(path, &record)?;
        let mut framed = Vec::with_capacity(body.len() + 8);
        let mut len4 = [0u8; 4];
        LittleEndian::write_u32(&mut len4, body.len() as u32);
        framed.extend_from_slice(&len4);
        framed.extend_from_slice(&body);
        let mut crc4 = [0u8; 4];
        LittleEndian::write_u32(&mut crc4, crc32fast::hash(&body));
        framed.extend_from_slice(&crc4);
        self.pending.extend_from_slice(&framed);
        self.index.insert(path.to_string(), record);
        Ok(())
    }
}

impl Storage for FileContainer {
    fn list_entities(&self, scope: &str) -> Result<Vec<EntityInfo>, StorageError> {
        self.ensure_open()?;
        let scope = scope.trim_end_matches('/');
        let mut out = Vec::new();
        for (path, record) in &self.index {
            let in_scope = if scope.is_empty() {
                true
            } else {
                path == scope || path.starts_with(&format!("{scope}/"))
            };
            if in_scope {
                out.push(EntityInfo {
                    path: path.clone(),
                    kind: record.kind,
                });
            }
        }
        Ok(out)
    }

    fn read_entity_type(&self, path: &str) -> Result<EntityType, StorageError> {
        self.ensure_open()?;
        let record = self
            .index
            .get(path)
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?;
        Ok(EntityType {
            kind: record.kind,
            descr: record.descr.clone(),
            dims: record.dims.clone(),
            named: record.named,
        })
    }

    fn read_entity_bytes(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.ensure_open()?;
        let record = self
            .index
            .get(path)
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?;
        let bytes = if record.flags & FLAG_DEFLATED != 0 {
            filters::deflate_decompress(&record.payload)?
        } else {
            record.payload.clone()
        };
        if bytes.len() as u64 != record.raw_len {
            return Err(FormatError::ValueSizeMismatch {
                type_name: record.descr.canonical_name().to_string(),
                expected: record.raw_len as usize,
                actual: bytes.len(),
            }
            .into());
        }
        Ok(bytes)
    }

    fn write_entity(
        &mut self,
        path: &str,
        kind: EntityKind,
        descr: &TypeDescr,
        dims: &[u64],
        bytes: &[u8],
        named: Option<TypeHandle>,
        compression: u8,
    ) -> Result<(), StorageError> {
        self.ensure_open()?;
        let raw_len = bytes.len() as u64;
        let (flags, payload) = if compression > 0 && !bytes.is_empty() {
            let packed = filters::deflate_compress(bytes, compression as u32)?;
            (FLAG_DEFLATED, packed)
        } else {
            (0, bytes.to_vec())
        };
        self.append_record(
            path,
            Record {
                kind,
                named,
                descr: descr.clone(),
                dims: dims.to_vec(),
                flags,
                raw_len,
                payload,
            },
        )
    }

    fn commit_type(
        &mut self,
        path: &str,
        descr: &CompoundDescriptor,
    ) -> Result<TypeHandle, StorageError> {
        self.ensure_open()?;
        let handle = TypeHandle(self.next_handle);
        self.append_record(
            path,
            Record {
                kind: EntityKind::NamedType,
                named: Some(handle),
                descr: TypeDescr::Compound(descr.clone()),
                dims: Vec::new(),
                flags: 0,
                raw_len: 0,
                payload: Vec::new(),
            },
        )?;
        self.next_handle += 1;
        self.committed.insert(handle.0, descr.clone());
        Ok(handle)
    }

    fn read_committed_type(
        &self,
        handle: TypeHandle,
    ) -> Result<CompoundDescriptor, StorageError> {
        self.ensure_open()?;
        self.committed
            .get(&handle.0)
            .cloned()
            .ok_or(StorageError::UnknownHandle(handle))
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.ensure_open()?;
        if self.pending.is_empty() && self.header_written {
            return Ok(());
        }
        if self.fresh && !self.header_written {
            let mut file = fs::File::create(&self.path)?;
            let mut header = [0u8; HEADER_LEN];
            header[..8].copy_from_slice(&SIGNATURE);
            header[8] = VERSION;
            file.write_all(&header)?;
            file.write_all(&self.pending)?;
            file.sync_all()?;
            self.header_written = true;
        } else {
            let mut file = OpenOptions::new().append(true).open(&self.path)?;
            file.write_all(&self.pending)?;
            file.sync_all()?;
        }
        self.pending.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<(), StorageError> {
        self.ensure_open()?;
        if !self.pending.is_empty() {
            self.sync()?;
        }
        self.closed = true;
        Ok(())
    }
}

fn serialize_record_body(path: &str, record: &Record) -> Result<Vec<u8>, FormatError> {
    if path.len() > u16::MAX as usize {
        return Err(FormatError::FieldTooLong {
            what: "path",
            max: u16::MAX as usize,
            actual: path.len(),
        });
    }
    let descr = record.descr.serialize();
    if descr.len() > u16::MAX as usize {
        return Err(FormatError::FieldTooLong {
            what: "type descriptor",
            max: u16::MAX as usize,
            actual: descr.len(),
        });
    }
    if record.dims.len() > u8::MAX as usize {
        return Err(FormatError::FieldTooLong {
            what: "dimension list",
            max: u8::MAX as usize,
            actual: record.dims.len(),
        });
    }
    let mut buf = Vec::new();
    let mut u2 = [0u8; 2];
    let mut u8b = [0u8; 8];
    LittleEndian::write_u16(&mut u2, path.len() as u16);
    buf.extend_from_slice(&u2);
    buf.extend_from_slice(path.as_bytes());
    buf.push(record.kind.tag());
    LittleEndian::write_u64(&mut u8b, record.named.map_or(0, |h| h.0));
    buf.extend_from_slice(&u8b);
    LittleEndian::write_u16(&mut u2, descr.len() as u16);
    buf.extend_from_slice(&u2);
    buf.extend_from_slice(&descr);
    buf.push(record.dims.len() as u8);
    for dim in &record.dims {
        LittleEndian::write_u64(&mut u8b, *dim);
        buf.extend_from_slice(&u8b);
    }
    buf.push(record.flags);
    LittleEndian::write_u64(&mut u8b, record.raw_len);
    buf.extend_from_slice(&u8b);
    buf.extend_from_slice(&record.payload);
    Ok(buf)
}

fn parse_record_body(body: &[u8]) -> Result<(String, Record), FormatError> {
    ensure_len(body, 0, 2)?;
    let path_len = LittleEndian::read_u16(&body[0..2]) as usize;
    let mut pos = 2;
    ensure_len(body, pos, path_len)?;
    let path = String::from_utf8_lossy(&body[pos..pos + path_len]).into_owned();
    pos += path_len;
    ensure_len(body, pos, 1 + 8 + 2)?;
    let kind = EntityKind::from_tag(body[pos])?;
    pos += 1;
    let named_raw = LittleEndian::read_u64(&body[pos..pos + 8]);
    let named = if named_raw == 0 {
        None
    } else {
        Some(TypeHandle(named_raw))
    };
    pos += 8;
    let descr_len = LittleEndian::read_u16(&body[pos..pos + 2]) as usize;
    pos += 2;
    ensure_len(body, pos, descr_len)?;
    let (descr, _) = TypeDescr::parse(&body[pos..pos + descr_len])?;
    pos += descr_len;
    ensure_len(body, pos, 1)?;
    let ndims = body[pos] as usize;
    pos += 1;
    ensure_len(body, pos, ndims * 8)?;
    let mut dims = Vec::with_capacity(ndims);
    for _ in 0..ndims {
        dims.push(LittleEndian::read_u64(&body[pos..pos + 8]));
        pos += 8;
    }
    ensure_len(body, pos, 1 + 8)?;
    let flags = body[pos];
    pos += 1;
    let raw_len = LittleEndian::read_u64(&body[pos..pos + 8]);
    pos += 8;
    let payload = body[pos..].to_vec();
    Ok((
        path,
        Record {
            kind,
            named,
            descr,
            dims,
            flags,
            raw_len,
            payload,
        },
    ))
}

fn ensure_len(data: &[u8], offset: usize, needed: usize) -> Result<(), FormatError> {
    if offset + needed > data.len() {
        Err(FormatError::UnexpectedEof {
            expected: offset + needed,
            available: data.len(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typereg::TypeRegistry;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rustyhl_container_{name}_{}", std::process::id()))
    }

    #[test]
    fn create_write_reopen() {
        let path = temp_path("basic");
        let mut c = FileContainer::create(&path);
        c.write_entity("/info", EntityKind::Group, &TypeDescr::None, &[], &[], None, 0)
            .unwrap();
        c.write_entity(
            "/info/xscale",
            EntityKind::Attribute,
            &TypeDescr::Float { size: 8 },
            &[],
            &10.0f64.to_le_bytes(),
            None,
            0,
        )
        .unwrap();
        c.close().unwrap();

        let reopened = FileContainer::open(&path).unwrap();
        let ty = reopened.read_entity_type("/info/xscale").unwrap();
        assert_eq!(ty.descr, TypeDescr::Float { size: 8 });
        assert!(ty.dims.is_empty());
        let bytes = reopened.read_entity_bytes("/info/xscale").unwrap();
        assert_eq!(bytes, 10.0f64.to_le_bytes());

        fs::remove_file(&path).ok();
    }

    #[test]
    fn deflated_payload_roundtrip() {
        let path = temp_path("deflate");
        let data: Vec<u8> = (0..10_000u32).flat_map(|i| (i as i32).to_le_bytes()).collect();
        let mut c = FileContainer::create(&path);
        c.write_entity(
            "/data",
            EntityKind::Dataset,
            &TypeDescr::Fixed { size: 4, signed: true },
            &[10_000],
            &data,
            None,
            6,
        )
        .unwrap();
        c.close().unwrap();

        let reopened = FileContainer::open(&path).unwrap();
        assert_eq!(reopened.read_entity_bytes("/data").unwrap(), data);
        // The stored file is smaller than the raw payload.
        assert!(fs::metadata(&path).unwrap().len() < data.len() as u64);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn committed_type_survives_reopen() {
        let path = temp_path("named");
        let descr = TypeRegistry::global()
            .describe_compound(&[("x", "double", 1), ("y", "double", 1)])
            .unwrap();
        let mut c = FileContainer::create(&path);
        let handle = c.commit_type("/types/point", &descr).unwrap();
        c.close().unwrap();

        let reopened = FileContainer::open(&path).unwrap();
        assert_eq!(reopened.read_committed_type(handle).unwrap(), descr);
        let listing = reopened.list_entities("/").unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].kind, EntityKind::NamedType);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn append_after_reopen() {
        let path = temp_path("append");
        let mut c = FileContainer::create(&path);
        c.write_entity("/a", EntityKind::Group, &TypeDescr::None, &[], &[], None, 0)
            .unwrap();
        c.close().unwrap();

        let mut c = FileContainer::open(&path).unwrap();
        c.write_entity("/b", EntityKind::Group, &TypeDescr::None, &[], &[], None, 0)
            .unwrap();
        c.close().unwrap();

        let reopened = FileContainer::open(&path).unwrap();
        let paths: Vec<String> = reopened
            .list_entities("/")
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        assert_eq!(paths, vec!["/a", "/b"]);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn scope_filters_listing() {
        let path = temp_path("scope");
        let mut c = FileContainer::create(&path);
        for p in ["/g1", "/g1/a", "/g2", "/g10"] {
            c.write_entity(p, EntityKind::Group, &TypeDescr::None, &[], &[], None, 0)
                .unwrap();
        }
        let paths: Vec<String> = c
            .list_entities("/g1")
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        // /g10 shares the prefix characters but is not a descendant.
        assert_eq!(paths, vec!["/g1", "/g1/a"]);
    }

    #[test]
    fn corrupted_record_is_rejected() {
        let path = temp_path("corrupt");
        let mut c = FileContainer::create(&path);
        c.write_entity(
            "/x",
            EntityKind::Attribute,
            &TypeDescr::Fixed { size: 4, signed: true },
            &[],
            &7i32.to_le_bytes(),
            None,
            0,
        )
        .unwrap();
        c.close().unwrap();

        let mut data = fs::read(&path).unwrap();
        let last = data.len() - 5;
        data[last] ^= 0xff;
        fs::write(&path, &data).unwrap();

        let err = FileContainer::open(&path).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Format(FormatError::ChecksumMismatch { .. })
        ));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn oversized_record_fields_are_rejected() {
        let mut c = FileContainer::create(temp_path("oversized"));

        let long_path = format!("/{}", "a".repeat(70_000));
        let err = c
            .write_entity(&long_path, EntityKind::Group, &TypeDescr::None, &[], &[], None, 0)
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Format(FormatError::FieldTooLong { what: "path", .. })
        ));

        let dims = vec![1u64; 300];
        let err = c
            .write_entity(
                "/d",
                EntityKind::Dataset,
                &TypeDescr::Fixed { size: 1, signed: false },
                &dims,
                &[0u8],
                None,
                0,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Format(FormatError::FieldTooLong { what: "dimension list", .. })
        ));

        // Nothing was indexed or staged for either rejected record.
        assert!(c.list_entities("/").unwrap().is_empty());
    }

    #[test]
    fn open_missing_file() {
        let err = FileContainer::open(temp_path("missing")).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn closed_container_rejects_calls() {
        let path = temp_path("closed");
        let mut c = FileContainer::create(&path);
        c.write_entity("/a", EntityKind::Group, &TypeDescr::None, &[], &[], None, 0)
            .unwrap();
        c.close().unwrap();
        assert!(matches!(c.read_entity_bytes("/a"), Err(StorageError::Closed)));
        assert!(matches!(c.close(), Err(StorageError::Closed)));
        fs::remove_file(&path).ok();
    }
}
