//! Descriptor persistence and the test list operations layered on top of it.
//!
//! `DescriptorStore` is the opaque external store: it hands out descriptors
//! and accepts full rewrites of their `tests` sequence. `TestStore` owns the
//! list semantics (newest first, id allocation, replace in place, delete) and
//! writes through on every mutation.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use tracing::{debug, info, instrument};

use crate::domain::{ProblemDescriptor, TestRecord, Verdict};
use crate::error::{HarnessError, HarnessResult};
use crate::util::file_stem_for;

/// Id for a test about to be prepended to `tests`.
///
/// Insertion always prepends, so the front record carries the highest id and
/// `front.id + 1` is fresh. Every path that mutates `tests` keeps that order;
/// one that does not must switch this to `max(ids) + 1`.
pub fn allocate_id(tests: &[TestRecord]) -> u64 {
  tests.first().map_or(0, |front| front.id + 1)
}

pub trait DescriptorStore: Send + Sync {
  fn get(&self, id: &str) -> HarnessResult<ProblemDescriptor>;

  /// Replace the whole `tests` sequence of descriptor `id`.
  fn update_tests(&self, id: &str, tests: &[TestRecord]) -> HarnessResult<()>;

  fn insert(&self, descriptor: ProblemDescriptor) -> HarnessResult<()>;

  /// Insert unless a descriptor with the same id exists. Returns whether it was inserted.
  fn insert_if_absent(&self, descriptor: ProblemDescriptor) -> HarnessResult<bool>;
}

fn not_found(id: &str) -> HarnessError {
  HarnessError::NotFound(format!("descriptor '{}'", id))
}

fn poisoned<T>(_: T) -> HarnessError {
  HarnessError::Store("descriptor store lock poisoned".into())
}

#[derive(Debug, Default)]
pub struct MemoryDescriptorStore {
  inner: RwLock<HashMap<String, ProblemDescriptor>>,
}

impl MemoryDescriptorStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl DescriptorStore for MemoryDescriptorStore {
  fn get(&self, id: &str) -> HarnessResult<ProblemDescriptor> {
    self.inner.read().map_err(poisoned)?.get(id).cloned().ok_or_else(|| not_found(id))
  }

  fn update_tests(&self, id: &str, tests: &[TestRecord]) -> HarnessResult<()> {
    let mut map = self.inner.write().map_err(poisoned)?;
    let d = map.get_mut(id).ok_or_else(|| not_found(id))?;
    d.tests = tests.to_vec();
    debug!(target: "content_testing::store", %id, tests = tests.len(), "Tests updated (memory)");
    Ok(())
  }

  fn insert(&self, descriptor: ProblemDescriptor) -> HarnessResult<()> {
    self.inner.write().map_err(poisoned)?.insert(descriptor.id.clone(), descriptor);
    Ok(())
  }

  fn insert_if_absent(&self, descriptor: ProblemDescriptor) -> HarnessResult<bool> {
    let mut map = self.inner.write().map_err(poisoned)?;
    if map.contains_key(&descriptor.id) {
      return Ok(false);
    }
    map.insert(descriptor.id.clone(), descriptor);
    Ok(true)
  }
}

/// One pretty-printed JSON file per descriptor under `dir`.
#[derive(Debug)]
pub struct JsonDirDescriptorStore {
  dir: PathBuf,
  writes: Mutex<()>,
}

impl JsonDirDescriptorStore {
  pub fn open(dir: impl Into<PathBuf>) -> HarnessResult<Self> {
    let dir = dir.into();
    fs::create_dir_all(&dir)?;
    info!(target: "content_testing::store", dir = %dir.display(), "Opened JSON descriptor store");
    Ok(Self { dir, writes: Mutex::new(()) })
  }

  fn path_for(&self, id: &str) -> PathBuf {
    self.dir.join(format!("{}.json", file_stem_for(id)))
  }

  fn read(&self, id: &str) -> HarnessResult<ProblemDescriptor> {
    let bytes = match fs::read(self.path_for(id)) {
      Ok(b) => b,
      Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found(id)),
      Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_slice(&bytes)?)
  }

  fn write(&self, descriptor: &ProblemDescriptor) -> HarnessResult<()> {
    let path = self.path_for(&descriptor.id);
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(descriptor)?)?;
    replace_file(&tmp, &path)
  }
}

fn replace_file(tmp: &Path, path: &Path) -> HarnessResult<()> {
  if let Err(e) = fs::rename(tmp, path) {
    let _ = fs::remove_file(tmp);
    return Err(e.into());
  }
  Ok(())
}

impl DescriptorStore for JsonDirDescriptorStore {
  fn get(&self, id: &str) -> HarnessResult<ProblemDescriptor> {
    self.read(id)
  }

  fn update_tests(&self, id: &str, tests: &[TestRecord]) -> HarnessResult<()> {
    let _guard = self.writes.lock().map_err(poisoned)?;
    let mut d = self.read(id)?;
    d.tests = tests.to_vec();
    self.write(&d)?;
    debug!(target: "content_testing::store", %id, tests = tests.len(), "Tests updated (json)");
    Ok(())
  }

  fn insert(&self, descriptor: ProblemDescriptor) -> HarnessResult<()> {
    let _guard = self.writes.lock().map_err(poisoned)?;
    self.write(&descriptor)
  }

  fn insert_if_absent(&self, descriptor: ProblemDescriptor) -> HarnessResult<bool> {
    let _guard = self.writes.lock().map_err(poisoned)?;
    if self.path_for(&descriptor.id).exists() {
      return Ok(false);
    }
    self.write(&descriptor)?;
    Ok(true)
  }
}

/// Validated content of a test about to be created or replaced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordFields {
  /// Bound keys, marker already stripped.
  pub response_dict: BTreeMap<String, String>,
  pub should_be: Verdict,
}

impl RecordFields {
  fn ensure_answers(&self) -> HarnessResult<()> {
    if self.response_dict.values().any(|v| !v.trim().is_empty()) {
      Ok(())
    } else {
      Err(HarnessError::Invalid("response_dict has no non-empty answer".into()))
    }
  }
}

/// List operations over one descriptor's `tests`. The descriptor passed in is
/// updated only after the store accepted the write.
pub struct TestStore<'a> {
  store: &'a dyn DescriptorStore,
}

impl<'a> TestStore<'a> {
  pub fn new(store: &'a dyn DescriptorStore) -> Self {
    Self { store }
  }

  /// Newest first.
  pub fn list<'d>(&self, descriptor: &'d ProblemDescriptor) -> &'d [TestRecord] {
    &descriptor.tests
  }

  #[instrument(level = "debug", skip(self, descriptor, input), fields(location = %descriptor.id))]
  pub fn add(&self, descriptor: &mut ProblemDescriptor, input: RecordFields) -> HarnessResult<TestRecord> {
    input.ensure_answers()?;
    let record = TestRecord {
      id: allocate_id(&descriptor.tests),
      location: descriptor.id.clone(),
      response_dict: input.response_dict,
      should_be: input.should_be,
      message: String::new(),
      verdict: None,
    };
    let mut tests = Vec::with_capacity(descriptor.tests.len() + 1);
    tests.push(record.clone());
    tests.extend(descriptor.tests.iter().cloned());
    self.persist(descriptor, tests)?;
    info!(target: "content_testing::store", location = %descriptor.id, id = record.id, should_be = %record.should_be, "Test added");
    Ok(record)
  }

  /// Replace the record with `id` in place; earlier run results are dropped.
  #[instrument(level = "debug", skip(self, descriptor, input), fields(location = %descriptor.id))]
  pub fn replace_at(&self, descriptor: &mut ProblemDescriptor, id: u64, input: RecordFields) -> HarnessResult<TestRecord> {
    input.ensure_answers()?;
    let pos = position_of(descriptor, id)?;
    let mut tests = descriptor.tests.clone();
    let slot = &mut tests[pos];
    slot.response_dict = input.response_dict;
    slot.should_be = input.should_be;
    slot.message.clear();
    slot.verdict = None;
    let record = slot.clone();
    self.persist(descriptor, tests)?;
    info!(target: "content_testing::store", location = %descriptor.id, id, "Test replaced");
    Ok(record)
  }

  #[instrument(level = "debug", skip(self, descriptor), fields(location = %descriptor.id))]
  pub fn delete(&self, descriptor: &mut ProblemDescriptor, id: u64) -> HarnessResult<()> {
    let pos = position_of(descriptor, id)?;
    let mut tests = descriptor.tests.clone();
    tests.remove(pos);
    self.persist(descriptor, tests)?;
    info!(target: "content_testing::store", location = %descriptor.id, id, "Test deleted");
    Ok(())
  }

  /// Single write of a full list, used after runs. Order and ids are the caller's.
  pub fn replace_all(&self, descriptor: &mut ProblemDescriptor, tests: Vec<TestRecord>) -> HarnessResult<()> {
    self.persist(descriptor, tests)
  }

  fn persist(&self, descriptor: &mut ProblemDescriptor, tests: Vec<TestRecord>) -> HarnessResult<()> {
    self.store.update_tests(&descriptor.id, &tests)?;
    descriptor.tests = tests;
    Ok(())
  }
}

fn position_of(descriptor: &ProblemDescriptor, id: u64) -> HarnessResult<usize> {
  if descriptor.tests.is_empty() {
    return Err(HarnessError::NotFound(format!("test {} in '{}' (no tests)", id, descriptor.id)));
  }
  descriptor
    .tests
    .iter()
    .position(|t| t.id == id)
    .ok_or_else(|| HarnessError::NotFound(format!("test {} in '{}'", id, descriptor.id)))
}
