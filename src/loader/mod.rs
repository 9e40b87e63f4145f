//! Loading binary units into the process
//!
//! [`LoadContext::load`] decodes an image, verifies its bytecode, links its imports
//! against the context's reference set and hands out the first exported type. A
//! loaded unit lives as long as some [`ExportedType`] or instance refers to it.

pub mod verifier;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::{Arc, Weak};
use thiserror::Error;

use crate::compiler::emit::{
    self, CHECKSUM_OFFSET, FORMAT_VERSION, HEADER_LEN, LENGTH_OFFSET, MAGIC,
};
use crate::compiler::{Import, MethodDef, TypeDef, Unit};
use crate::references::{Builtin, ReferenceSet};
use crate::runtime::Value;

/// Reasons a binary unit cannot be loaded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The image is not a well-formed binary unit
    #[error("Malformed binary unit: {0}")]
    Malformed(String),

    /// The bytecode failed verification
    #[error("Invalid bytecode in {location}: {message}")]
    InvalidBytecode {
        /// Type and method containing the problem
        location: String,
        /// What is wrong
        message: String,
    },

    /// An import names a library or function the reference set does not provide
    #[error("Unresolved import '{function}' from library '{library}'")]
    UnresolvedImport {
        /// Reference identifier
        library: String,
        /// Function name
        function: String,
    },

    /// The unit contains no exported type
    #[error("Binary unit '{0}' does not export a type")]
    NoExportedType(String),
}

/// A unit resident in the process
pub struct LoadedUnit {
    id: String,
    unit: Unit,
    imports: Vec<Arc<dyn Builtin>>,
    constants: Vec<Value>,
}

impl LoadedUnit {
    /// Library name the unit was compiled as
    pub fn name(&self) -> &str {
        &self.unit.name
    }

    /// Short hex identity derived from the payload checksum
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Types in declaration order
    pub fn types(&self) -> &[TypeDef] {
        &self.unit.types
    }

    /// Import table
    pub fn imports(&self) -> &[Import] {
        &self.unit.imports
    }

    pub(crate) fn builtin(&self, index: usize) -> Option<&Arc<dyn Builtin>> {
        self.imports.get(index)
    }

    pub(crate) fn constant(&self, index: usize) -> Option<&Value> {
        self.constants.get(index)
    }

    pub(crate) fn name_constant(&self, index: usize) -> &str {
        self.unit
            .constants
            .get(index)
            .and_then(|c| c.as_name())
            .unwrap_or_default()
    }
}

impl Drop for LoadedUnit {
    fn drop(&mut self) {
        tracing::debug!(unit = %self.unit.name, id = %self.id, "unloaded binary unit");
    }
}

impl fmt::Debug for LoadedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedUnit")
            .field("name", &self.unit.name)
            .field("id", &self.id)
            .field("types", &self.unit.types.len())
            .finish()
    }
}

/// The type selected from a loaded unit
#[derive(Debug, Clone)]
pub struct ExportedType {
    unit: Arc<LoadedUnit>,
    index: usize,
}

impl ExportedType {
    /// Type name
    pub fn name(&self) -> &str {
        &self.definition().name
    }

    /// Compiled definition
    pub fn definition(&self) -> &TypeDef {
        &self.unit.types()[self.index]
    }

    /// Finds a method by name
    pub fn method(&self, name: &str) -> Option<(usize, &MethodDef)> {
        self.definition().method(name)
    }

    /// The unit the type belongs to
    pub fn unit(&self) -> &Arc<LoadedUnit> {
        &self.unit
    }

    /// Index of the type within its unit
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Loads binary units against a fixed reference set
pub struct LoadContext {
    refs: ReferenceSet,
    live: Mutex<Vec<Weak<LoadedUnit>>>,
}

impl LoadContext {
    /// Creates a context that links against `refs`
    pub fn new(refs: &ReferenceSet) -> Self {
        LoadContext {
            refs: refs.clone(),
            live: Mutex::new(Vec::new()),
        }
    }

    /// Loads an image and selects its first exported type
    pub fn load(&self, image: &[u8]) -> Result<ExportedType, LoadError> {
        let unit = decode(image)?;
        verifier::verify(&unit)?;
        let imports = self.link(&unit)?;

        let Some((index, entry)) = unit.exported().next() else {
            return Err(LoadError::NoExportedType(unit.name.clone()));
        };
        if entry.constructor.arity != 1 {
            return Err(LoadError::InvalidBytecode {
                location: format!("{}.{}", entry.name, entry.constructor.name),
                message: format!(
                    "entry type constructor takes {} parameters, expected 1",
                    entry.constructor.arity
                ),
            });
        }

        let constants = unit.constants.iter().map(|c| c.to_value()).collect();
        let loaded = Arc::new(LoadedUnit {
            id: emit::image_id(image),
            unit,
            imports,
            constants,
        });

        tracing::debug!(
            unit = %loaded.name(),
            id = %loaded.id(),
            entry_type = %loaded.types()[index].name,
            imports = loaded.imports.len(),
            "loaded binary unit"
        );

        let mut live = self.live.lock();
        live.retain(|weak| weak.strong_count() > 0);
        live.push(Arc::downgrade(&loaded));

        Ok(ExportedType {
            unit: loaded,
            index,
        })
    }

    /// Number of units loaded through this context that are still resident
    pub fn live_units(&self) -> usize {
        let mut live = self.live.lock();
        live.retain(|weak| weak.strong_count() > 0);
        live.len()
    }

    fn link(&self, unit: &Unit) -> Result<Vec<Arc<dyn Builtin>>, LoadError> {
        unit.imports
            .iter()
            .map(|import| {
                self.refs
                    .library(&import.library)
                    .and_then(|library| library.get(&import.function))
                    .ok_or_else(|| LoadError::UnresolvedImport {
                        library: import.library.clone(),
                        function: import.function.clone(),
                    })
            })
            .collect()
    }
}

/// Decodes a binary image back into a unit
pub fn decode(image: &[u8]) -> Result<Unit, LoadError> {
    if image.len() < HEADER_LEN {
        return Err(LoadError::Malformed(format!(
            "image is {} bytes, shorter than the {} byte header",
            image.len(),
            HEADER_LEN
        )));
    }
    if image[..4] != MAGIC {
        return Err(LoadError::Malformed("bad magic".to_string()));
    }

    let version = u16::from_le_bytes([image[4], image[5]]);
    if version != FORMAT_VERSION {
        return Err(LoadError::Malformed(format!(
            "unsupported format version {}",
            version
        )));
    }

    let length = u32::from_le_bytes([
        image[LENGTH_OFFSET],
        image[LENGTH_OFFSET + 1],
        image[LENGTH_OFFSET + 2],
        image[LENGTH_OFFSET + 3],
    ]) as usize;
    let payload = &image[HEADER_LEN..];
    if payload.len() != length {
        return Err(LoadError::Malformed(format!(
            "payload is {} bytes, header declares {}",
            payload.len(),
            length
        )));
    }

    if Sha256::digest(payload).as_slice() != &image[CHECKSUM_OFFSET..LENGTH_OFFSET] {
        return Err(LoadError::Malformed("checksum mismatch".to_string()));
    }

    serde_json::from_slice(payload).map_err(|e| LoadError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompileOptions, Compiler, SourceUnit};

    const SOURCE: &str = r#"
        (defclass- Helper (d) (defmethod process () 0))
        (defclass Script (deps)
          (defmethod process () (str "Message: " (. deps message))))
    "#;

    fn compile(source: &str, refs: &ReferenceSet) -> Vec<u8> {
        let result = Compiler::new(CompileOptions::default())
            .compile(&SourceUnit::new(source), refs, "loader_test")
            .unwrap();
        result.binary().unwrap().to_vec()
    }

    #[test]
    fn test_load_selects_exported_type() {
        let refs = ReferenceSet::standard();
        let image = compile(SOURCE, &refs);
        let context = LoadContext::new(&refs);

        let entry = context.load(&image).unwrap();
        assert_eq!(entry.name(), "Script");
        assert_eq!(entry.index(), 1);
        assert!(entry.method("process").is_some());
        assert_eq!(entry.unit().name(), "loader_test");
    }

    #[test]
    fn test_units_are_released_with_their_handles() {
        let refs = ReferenceSet::standard();
        let image = compile(SOURCE, &refs);
        let context = LoadContext::new(&refs);

        let first = context.load(&image).unwrap();
        let second = context.load(&image).unwrap();
        assert_eq!(context.live_units(), 2);

        drop(first);
        assert_eq!(context.live_units(), 1);
        let clone = second.clone();
        drop(second);
        assert_eq!(context.live_units(), 1);
        drop(clone);
        assert_eq!(context.live_units(), 0);
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let refs = ReferenceSet::standard();
        let mut image = compile(SOURCE, &refs);
        let last = image.len() - 2;
        image[last] ^= 0x20;

        let err = LoadContext::new(&refs).load(&image).unwrap_err();
        assert_eq!(err, LoadError::Malformed("checksum mismatch".to_string()));
    }

    #[test]
    fn test_truncated_and_foreign_images() {
        let context = LoadContext::new(&ReferenceSet::standard());
        assert!(matches!(context.load(b"SRUN"), Err(LoadError::Malformed(_))));
        assert!(matches!(
            context.load(&[0u8; HEADER_LEN]),
            Err(LoadError::Malformed(_))
        ));
    }

    #[test]
    fn test_missing_library_at_load_time() {
        let image = compile(SOURCE, &ReferenceSet::standard());
        let refs = ReferenceSet::new().with(crate::references::stdlib::tasks());

        let err = LoadContext::new(&refs).load(&image).unwrap_err();
        assert_eq!(
            err,
            LoadError::UnresolvedImport {
                library: crate::references::CORE_LIBRARY.to_string(),
                function: "str".to_string(),
            }
        );
    }

    #[test]
    fn test_no_exported_type() {
        let unit = Unit {
            name: "empty".to_string(),
            imports: Vec::new(),
            constants: Vec::new(),
            types: Vec::new(),
        };
        let image = emit::encode(&unit).unwrap();
        let err = LoadContext::new(&ReferenceSet::standard())
            .load(&image)
            .unwrap_err();
        assert_eq!(err, LoadError::NoExportedType("empty".to_string()));
    }
}
