//! Loading of module images into isolated execution contexts.
//!
//! Every loaded module lives in its own [`ExecutionContext`], keyed by its
//! [`ModuleId`] in an [`ExecutionContextRegistry`]. A [`LoadedModuleHandle`]
//! looks its context up on every call, so once the context is removed the
//! handle observes the unloaded state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ember_lang::{
    Accessibility, MemberDef, MemberKind, Module, ParamDef, Runtime, RuntimeOptions, TypeDef, TypeKind, Value,
};
use tracing::{debug, info};

use crate::engine::BinaryModule;
use crate::error::{Error, InvokeError, LoadError};
use crate::module_id::ModuleId;

#[derive(Debug)]
struct ExecutionContext {
    module: Module,
    /// Set for modules loaded from a file.
    location: Option<PathBuf>,
}

/// Live execution contexts by module identity.
#[derive(Debug, Default)]
pub struct ExecutionContextRegistry {
    contexts: DashMap<ModuleId, Arc<ExecutionContext>>,
}

impl ExecutionContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.contexts.contains_key(id)
    }

    /// On-disk locations of the modules loaded from files, sorted.
    pub fn locations(&self) -> Vec<PathBuf> {
        let mut locations = self
            .contexts
            .iter()
            .filter_map(|entry| entry.value().location.clone())
            .collect::<Vec<_>>();
        locations.sort();
        locations
    }

    fn insert(&self, id: ModuleId, context: ExecutionContext) -> Result<(), LoadError> {
        match self.contexts.entry(id) {
            Entry::Occupied(entry) => Err(LoadError::DuplicateModule(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(context));
                Ok(())
            }
        }
    }

    fn get(&self, id: &ModuleId) -> Option<Arc<ExecutionContext>> {
        self.contexts.get(id).map(|entry| Arc::clone(entry.value()))
    }

    fn remove(&self, id: &ModuleId) -> bool {
        self.contexts.remove(id).is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ModuleLoader {
    registry: Arc<ExecutionContextRegistry>,
    runtime: RuntimeOptions,
}

impl ModuleLoader {
    pub fn new(registry: Arc<ExecutionContextRegistry>, runtime: RuntimeOptions) -> Self {
        Self { registry, runtime }
    }

    pub fn registry(&self) -> &Arc<ExecutionContextRegistry> {
        &self.registry
    }

    /// Loads an emitted module. Its image must carry the identity it was
    /// compiled under.
    pub fn load(&self, binary: BinaryModule) -> Result<LoadedModuleHandle, Error> {
        let module = ember_lang::decode(binary.as_bytes()).map_err(LoadError::from)?;
        if module.name != binary.module_id().as_str() {
            return Err(LoadError::IdentityMismatch {
                expected: binary.module_id().clone(),
                found: module.name,
            }
            .into());
        }

        self.register(binary.module_id().clone(), module, None)
    }

    /// Loads a module image from disk. The file becomes a candidate of the
    /// loaded-module reference strategy.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<LoadedModuleHandle, Error> {
        let path = path.as_ref();
        let (location, bytes) = path
            .canonicalize()
            .and_then(|location| std::fs::read(&location).map(|bytes| (location, bytes)))
            .map_err(|e| LoadError::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        let module = ember_lang::decode(&bytes).map_err(LoadError::from)?;

        self.register(ModuleId::from(module.name.clone()), module, Some(location))
    }

    fn register(&self, id: ModuleId, module: Module, location: Option<PathBuf>) -> Result<LoadedModuleHandle, Error> {
        let types = module.types.len();
        self.registry.insert(id.clone(), ExecutionContext { module, location })?;
        info!(module_id = %id, types, "Loaded module");

        Ok(LoadedModuleHandle {
            id,
            registry: Arc::clone(&self.registry),
            runtime: self.runtime,
        })
    }
}

/// A loaded module. Dropping the handle unloads the module.
#[derive(Debug)]
pub struct LoadedModuleHandle {
    id: ModuleId,
    registry: Arc<ExecutionContextRegistry>,
    runtime: RuntimeOptions,
}

impl LoadedModuleHandle {
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    pub fn is_loaded(&self) -> bool {
        self.registry.contains(&self.id)
    }

    fn context(&self) -> Result<Arc<ExecutionContext>, Error> {
        self.registry.get(&self.id).ok_or_else(|| Error::Unloaded(self.id.clone()))
    }

    /// The type with exactly this fully-qualified name
    /// (`Namespace.Outer+Inner`), whatever its accessibility.
    pub fn resolve(&self, full_name: &str) -> Result<Option<TypeDescriptor>, Error> {
        let context = self.context()?;
        Ok(context
            .module
            .find_type(full_name)
            .map(|(_, def)| TypeDescriptor::new(&context.module, def)))
    }

    /// Every type of the module in declaration order.
    pub fn types(&self) -> Result<Vec<TypeDescriptor>, Error> {
        let context = self.context()?;
        Ok(context
            .module
            .types
            .iter()
            .map(|def| TypeDescriptor::new(&context.module, def))
            .collect())
    }

    /// Runs the static method `method` of `type_name` with `args`.
    pub fn invoke(&self, type_name: &str, method: &str, args: Vec<Value>) -> Result<Value, Error> {
        let context = self.context()?;
        let module = &context.module;

        let (type_index, def) = module
            .find_type(type_name)
            .ok_or_else(|| InvokeError::TypeNotFound(type_name.to_string()))?;
        let candidates = def
            .members
            .iter()
            .enumerate()
            .filter(|(_, m)| m.kind == MemberKind::Method && m.is_static && m.name == method)
            .collect::<Vec<_>>();
        if candidates.is_empty() {
            return Err(InvokeError::MethodNotFound {
                type_name: type_name.to_string(),
                method: method.to_string(),
            }
            .into());
        }

        let (member_index, member) = candidates
            .into_iter()
            .find(|(_, m)| m.params.len() == args.len())
            .ok_or_else(|| InvokeError::NoOverload {
                type_name: type_name.to_string(),
                method: method.to_string(),
                arity: args.len(),
            })?;
        let args = args
            .into_iter()
            .zip(&member.params)
            .enumerate()
            .map(|(index, (arg, param))| convert_argument(module, method, index, arg, param))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(module_id = %self.id, type_name, method, "Invoking method");
        Runtime::new(module, self.runtime)
            .call(type_index as u32, member_index as u32, args)
            .map_err(|e| InvokeError::from(e).into())
    }

    /// Removes the module's execution context. Later calls fail with
    /// [`Error::Unloaded`].
    pub fn unload(&self) -> Result<(), Error> {
        if self.registry.remove(&self.id) {
            info!(module_id = %self.id, "Unloaded module");
            Ok(())
        } else {
            Err(Error::Unloaded(self.id.clone()))
        }
    }
}

impl Drop for LoadedModuleHandle {
    fn drop(&mut self) {
        if self.registry.remove(&self.id) {
            debug!(module_id = %self.id, "Unloaded module on drop");
        }
    }
}

fn convert_argument(module: &Module, method: &str, index: usize, arg: Value, param: &ParamDef) -> Result<Value, Error> {
    let found = arg.type_name();
    let converted = match (param.ty.as_str(), arg) {
        ("int", arg @ Value::Int(_))
        | ("double", arg @ Value::Double(_))
        | ("bool", arg @ Value::Bool(_))
        | ("string", arg @ (Value::String(_) | Value::Null)) => Some(arg),
        ("double", Value::Int(n)) => Some(Value::Double(n as f64)),
        ("object", Value::Void) => None,
        ("object", arg) => Some(arg),
        (ty, arg) => match module.find_type(ty) {
            Some((_, def)) if def.kind == TypeKind::Enum => matches!(arg, Value::Int(_)).then_some(arg),
            Some((_, def)) if matches!(def.kind, TypeKind::Class | TypeKind::Interface) => {
                matches!(arg, Value::Null).then_some(arg)
            }
            _ => None,
        },
    };

    converted.ok_or_else(|| {
        InvokeError::ArgumentType {
            method: method.to_string(),
            index,
            expected: param.ty.clone(),
            found,
        }
        .into()
    })
}

/// Public view of a loaded type.
#[derive(PartialEq, Debug, Clone)]
pub struct TypeDescriptor {
    pub full_name: String,
    pub kind: TypeKind,
    pub accessibility: Accessibility,
    pub is_static: bool,
    pub is_sealed: bool,
    pub is_abstract: bool,
    /// Full name of the enclosing type of a nested type.
    pub declaring_type: Option<String>,
    pub bases: Vec<String>,
    pub members: Vec<MemberDescriptor>,
}

impl TypeDescriptor {
    fn new(module: &Module, def: &TypeDef) -> Self {
        Self {
            full_name: def.full_name.clone(),
            kind: def.kind,
            accessibility: def.accessibility,
            is_static: def.is_static,
            is_sealed: def.is_sealed,
            is_abstract: def.is_abstract,
            declaring_type: def
                .declaring_type
                .and_then(|index| module.types.get(index as usize))
                .map(|t| t.full_name.clone()),
            bases: def.bases.clone(),
            members: def.members.iter().map(MemberDescriptor::from).collect(),
        }
    }

    pub fn name(&self) -> &str {
        let innermost = self.full_name.rsplit('+').next().unwrap_or(&self.full_name);
        innermost.rsplit('.').next().unwrap_or(innermost)
    }

    pub fn member(&self, name: &str) -> Option<&MemberDescriptor> {
        self.members.iter().find(|m| m.name == name)
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct MemberDescriptor {
    pub name: String,
    pub kind: MemberKind,
    pub accessibility: Accessibility,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_readonly: bool,
    /// Field or property type, return type, or the enum of an enum member.
    pub ty: String,
    pub params: Vec<ParamDef>,
    /// Value of an enum member or constant.
    pub value: Option<Value>,
}

impl From<&MemberDef> for MemberDescriptor {
    fn from(def: &MemberDef) -> Self {
        Self {
            name: def.name.clone(),
            kind: def.kind,
            accessibility: def.accessibility,
            is_static: def.is_static,
            is_abstract: def.is_abstract,
            is_readonly: def.is_readonly,
            ty: def.ty.clone(),
            params: def.params.clone(),
            value: def.constant.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn module() -> Module {
        let def = |full_name: &str, kind| TypeDef {
            full_name: full_name.to_string(),
            kind,
            accessibility: Accessibility::Public,
            is_static: false,
            is_sealed: false,
            is_abstract: false,
            declaring_type: None,
            bases: Vec::new(),
            members: Vec::new(),
        };

        Module {
            name: "m".to_string(),
            types: vec![def("Color", TypeKind::Enum), def("Shape", TypeKind::Class)],
            references: Vec::new(),
        }
    }

    #[rstest]
    #[case::int("int", Value::Int(1), Some(Value::Int(1)))]
    #[case::widening("double", Value::Int(2), Some(Value::Double(2.0)))]
    #[case::null_string("string", Value::Null, Some(Value::Null))]
    #[case::object("object", Value::Bool(true), Some(Value::Bool(true)))]
    #[case::void_object("object", Value::Void, None)]
    #[case::enum_value("Color", Value::Int(3), Some(Value::Int(3)))]
    #[case::null_class("Shape", Value::Null, Some(Value::Null))]
    #[case::narrowing("int", Value::Double(1.0), None)]
    #[case::int_class("Shape", Value::Int(0), None)]
    #[case::unknown_type("Missing", Value::Null, None)]
    fn test_convert_argument(#[case] ty: &str, #[case] arg: Value, #[case] expected: Option<Value>) {
        let param = ParamDef {
            name: "p".to_string(),
            ty: ty.to_string(),
        };

        match (convert_argument(&module(), "M", 0, arg, &param), expected) {
            (Ok(value), Some(expected)) => assert_eq!(value, expected),
            (Err(Error::Invoke(InvokeError::ArgumentType { expected, .. })), None) => assert_eq!(expected, ty),
            (result, expected) => panic!("unexpected {:?}, expected {:?}", result, expected),
        }
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let registry = Arc::new(ExecutionContextRegistry::new());
        let loader = ModuleLoader::new(Arc::clone(&registry), RuntimeOptions::default());
        let binary = BinaryModule::new(ModuleId::from("m"), ember_lang::encode(&module()));

        let handle = loader.load(binary.clone()).unwrap();
        assert!(matches!(
            loader.load(binary),
            Err(Error::Load(LoadError::DuplicateModule(id))) if id == *handle.id()
        ));
        assert_eq!(registry.len(), 1);
        assert_eq!(handle.types().unwrap().len(), 2);
        assert!(registry.locations().is_empty());
    }
}
