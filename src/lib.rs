pub mod core;
pub mod storage;
pub mod index;
pub mod codec;
pub mod schema;
pub mod propset;
pub mod mapper;
pub mod reader;
pub mod writer;
pub mod reindex;

pub use crate::core::config::{Config, TuningProfile};
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::manager::{DirectoryProvider, FsDirectoryProvider, IndexManager, PoolKind};
pub use crate::mapper::document_mapper::{DocumentMapper, PropertySelector};
pub use crate::propset::index::PropertySetIndex;
pub use crate::propset::model::{Property, PropertySet, PropertyValue, Value};
pub use crate::propset::path::Path;
pub use crate::reindex::reindexer::{DirectReindexer, IndirectReindexer, Reindexer};
pub use crate::schema::types::{PropertyKey, PropertyTypeDefinition, StaticTypeRegistry, TypeDefinitions, ValueType};

/*
┌──────────────────────────────── PROPINDEX ARCHITECTURE ─────────────────────────────────┐
│                                                                                          │
│  ┌─────────────────────────┐      ┌─────────────────────────┐                           │
│  │ struct PropertySetIndex │─────▶│ struct DocumentMapper   │  PropertySet <-> Document │
│  │ • manager               │      │ • types: TypeDefinitions│                           │
│  │ • mapper                │      │ • names: FieldNames     │──▶ ValueCodec             │
│  │ • acl_filter            │      └─────────────────────────┘                           │
│  └───────────┬─────────────┘                                                            │
│              ▼                                                                           │
│  ┌─────────────────────────────────────────────────────────────┐                        │
│  │ struct IndexManager                                         │                        │
│  │ • lock: WriteLock               // gates every write        │                        │
│  │ • state: Mutex<writer | primary reader>                     │                        │
│  │ • pool / aging_pool: ReaderPool // lock-free reads          │                        │
│  │ • storage: Arc<StorageLayout>                               │                        │
│  └───────┬───────────────────────────────┬─────────────────────┘                        │
│          ▼                               ▼                                               │
│  ┌────────────────────┐        ┌───────────────────────────────┐                        │
│  │ struct IndexWriter │        │ struct ReaderPool             │                        │
│  │ • segments + dels  │        │ • items: slot/version/refresh │                        │
│  │ • FileLock         │        │   └─▶ RefCountedReader        │                        │
│  │ • LogMergePolicy   │        │         └─▶ IndexReader       │                        │
│  └─────────┬──────────┘        └──────────────┬────────────────┘                        │
│            ▼                                  ▼                                          │
│  ┌─────────────────────────────────────────────────────────────────┐                     │
│  │ StorageLayout: segments/<id>.seg (lz4 + crc32), meta/checkpoint │                     │
│  │                write.lock, SegmentCache                         │                     │
│  └─────────────────────────────────────────────────────────────────┘                     │
│                                                                                          │
│  DirectReindexer: clear + add from source, in place                                     │
│  IndirectReindexer: build in scratch index, then add_indexes into target                │
└──────────────────────────────────────────────────────────────────────────────────────────┘
*/
