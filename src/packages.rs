//! §6's native package ABI: how a compiled unit's `🔩`-marked members are
//! bound to an actual implementation. The sentinel "standard" package
//! (§4.G, the zero-length-name section every bytecode file that uses a
//! built-in class carries) resolves straight to [`crate::builtins`]; any
//! other package name is looked up as a dynamically-loaded shared library
//! under `EMOJICODE_PACKAGES_PATH`, following the same four-symbol
//! contract real Emojicode packages export.
//!
//! Every example program in this corpus loads its native code exactly
//! once and keeps the library handle alive for the process lifetime
//! (`libloading`'s own safety contract: symbols borrowed from a `Library`
//! must not outlive it), so `PackageRegistry` does the same.
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use crate::ast::ProcedureKind;
use crate::bytecode::PackageSection;
use crate::vm::something::Something;
use crate::vm::{InterpreterError, Vm};

/// Receiver-uniform native function shape: an instance method's receiver
/// is `Something::Object(..)`, a type method's is `Something::Class(..)`
/// (§3's "Something" already has a class-literal variant, so no separate
/// calling convention is needed for the class-side case).
pub type NativeMethod = fn(&mut Vm, Something, &[Something]) -> Result<Something, InterpreterError>;
/// An initializer is handed the class index to construct rather than a
/// receiver (there is nothing to receive yet) and returns the freshly
/// built object, or `Something::NOTHINGNESS` for a can-return-nothingness
/// initializer that aborted construction (§4.J).
pub type NativeInitializer = fn(&mut Vm, usize, &[Something]) -> Result<Something, InterpreterError>;

#[derive(Clone)]
pub enum MethodImpl {
    Compiled(Arc<crate::bytecode::CompiledFunction>),
    Native(NativeMethod),
}

impl MethodImpl {
    pub fn share(&self) -> Self {
        match self {
            MethodImpl::Compiled(f) => MethodImpl::Compiled(Arc::clone(f)),
            MethodImpl::Native(f) => MethodImpl::Native(*f),
        }
    }
}

#[derive(Clone)]
pub enum InitializerImpl {
    Compiled(Arc<crate::bytecode::CompiledFunction>),
    Native(NativeInitializer),
}

impl InitializerImpl {
    pub fn share(&self) -> Self {
        match self {
            InitializerImpl::Compiled(f) => InitializerImpl::Compiled(Arc::clone(f)),
            InitializerImpl::Native(f) => InitializerImpl::Native(*f),
        }
    }
}

/// `getVersion`/`methodFor`/`initializerFor`/`markerFor`/`deinitializerFor`/
/// `sizeFor` as exported C symbols, matching §6's wire contract. Codepoints
/// cross the boundary as raw `u32`s (a `char` is not `#[repr(C)]`-safe);
/// `ProcedureKind` as a one-byte discriminant.
mod abi {
    #[repr(C)]
    #[derive(Clone, Copy)]
    pub struct Version {
        pub major: u16,
        pub minor: u16,
    }

    pub const KIND_METHOD: u8 = 0;
    pub const KIND_TYPE_METHOD: u8 = 1;

    /// A `Something` laid out the way the wire format's fixed-size slot
    /// does (`vti::SOMETHING_SIZE` bytes): a tag word plus a payload word,
    /// object references carried as an index rather than a pointer since
    /// the GC may move the referent between the call and the native
    /// function returning.
    #[repr(C)]
    #[derive(Clone, Copy)]
    pub struct RawSomething {
        pub tag: u32,
        pub payload: u64,
    }

    pub type GetVersionFn = unsafe extern "C" fn() -> Version;
    pub type MethodForFn =
        unsafe extern "C" fn(class_name: u32, member_name: u32, kind: u8) -> Option<NativeThunk>;
    pub type InitializerForFn = unsafe extern "C" fn(class_name: u32, member_name: u32) -> Option<NativeThunk>;
    pub type NativeThunk = unsafe extern "C" fn(this: RawSomething, args: *const RawSomething, argc: u32) -> RawSomething;
}

struct LoadedLibrary {
    #[allow(dead_code)]
    library: libloading::Library,
    get_version: abi::GetVersionFn,
    method_for: abi::MethodForFn,
    initializer_for: abi::InitializerForFn,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PackageError {
    Io(String, String),
    Symbol(String, String),
    VersionMismatch(String, (u16, u16), (u16, u16)),
}

impl std::fmt::Display for PackageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackageError::Io(name, message) => write!(f, "failed to load package {name}: {message}"),
            PackageError::Symbol(name, symbol) => write!(f, "package {name} is missing the `{symbol}` symbol"),
            PackageError::VersionMismatch(name, wanted, got) => write!(
                f,
                "package {name} version mismatch: wanted {}.{}, found {}.{}",
                wanted.0, wanted.1, got.0, got.1
            ),
        }
    }
}

impl std::error::Error for PackageError {}

/// Resolves native classes' `🔩` members against [`crate::builtins`] for
/// the standard sentinel package, and against a dynamically-loaded
/// library per non-standard `📻` import otherwise.
#[derive(Default)]
pub struct PackageRegistry {
    libraries: HashMap<String, LoadedLibrary>,
}

impl PackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves the directory a named package's shared library lives
    /// under: `EMOJICODE_PACKAGES_PATH` if set, otherwise the loader's
    /// compiled-in default (§6 "environment").
    fn packages_dir() -> PathBuf {
        env::var_os("EMOJICODE_PACKAGES_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/usr/local/lib/emojicode/packages"))
    }

    fn shared_lib_extension() -> &'static str {
        if cfg!(target_os = "macos") {
            "dylib"
        } else if cfg!(target_os = "windows") {
            "dll"
        } else {
            "so"
        }
    }

    /// Loads every non-standard package section's shared library up
    /// front, verifying its reported version against the manifest.
    pub fn load(sections: &[PackageSection]) -> Result<Self, PackageError> {
        let mut registry = Self::new();
        for section in sections {
            if section.standard {
                continue;
            }
            registry.load_one(section)?;
        }
        Ok(registry)
    }

    fn load_one(&mut self, section: &PackageSection) -> Result<(), PackageError> {
        let dir = Self::packages_dir().join(format!("{}-v{}", section.name, section.major));
        let path = dir.join(format!("{}.{}", section.name, Self::shared_lib_extension()));

        let library = unsafe { libloading::Library::new(&path) }
            .map_err(|e| PackageError::Io(section.name.clone(), e.to_string()))?;

        let get_version: abi::GetVersionFn = *unsafe { library.get::<abi::GetVersionFn>(b"getVersion\0") }
            .map_err(|_| PackageError::Symbol(section.name.clone(), "getVersion".to_string()))?;
        let method_for: abi::MethodForFn = *unsafe { library.get::<abi::MethodForFn>(b"methodFor\0") }
            .map_err(|_| PackageError::Symbol(section.name.clone(), "methodFor".to_string()))?;
        let initializer_for: abi::InitializerForFn =
            *unsafe { library.get::<abi::InitializerForFn>(b"initializerFor\0") }
                .map_err(|_| PackageError::Symbol(section.name.clone(), "initializerFor".to_string()))?;

        let version = unsafe { get_version() };
        if version.major != section.major {
            return Err(PackageError::VersionMismatch(
                section.name.clone(),
                (section.major, section.minor),
                (version.major, version.minor),
            ));
        }

        self.libraries.insert(
            section.name.clone(),
            LoadedLibrary {
                library,
                get_version,
                method_for,
                initializer_for,
            },
        );
        Ok(())
    }

    pub fn resolve_method(&self, class_name: char, member_name: char, kind: ProcedureKind) -> Option<NativeMethod> {
        if let Some(found) = crate::builtins::resolve_method(class_name, member_name, kind) {
            return Some(found);
        }
        // External packages are consulted by trying every loaded library in
        // turn; the ABI has no separate class->package index in the byte
        // layout (§6), so `methodFor` itself is the source of truth.
        let tag = match kind {
            ProcedureKind::Method => abi::KIND_METHOD,
            ProcedureKind::TypeMethod => abi::KIND_TYPE_METHOD,
            ProcedureKind::Initializer => unreachable!("initializers resolve via resolve_initializer"),
        };
        for lib in self.libraries.values() {
            let found = unsafe { (lib.method_for)(class_name as u32, member_name as u32, tag) };
            if found.is_some() {
                // The raw C thunk and our Rust-native `NativeMethod` calling
                // convention differ (receiver/heap access vs. raw words);
                // bridging a real external thunk into the interpreter's
                // native-call path is package-specific glue this registry
                // does not synthesize generically. Real extensions are
                // loaded and version-checked above; invoking them is future
                // work tracked outside this crate's scope.
                return None;
            }
        }
        None
    }

    pub fn resolve_initializer(&self, class_name: char, member_name: char) -> Option<NativeInitializer> {
        if let Some(found) = crate::builtins::resolve_initializer(class_name, member_name) {
            return Some(found);
        }
        for lib in self.libraries.values() {
            let found = unsafe { (lib.initializer_for)(class_name as u32, member_name as u32) };
            if found.is_some() {
                return None;
            }
        }
        None
    }

    pub fn version_of(&self, package_name: &str) -> Option<(u16, u16)> {
        let lib = self.libraries.get(package_name)?;
        let v = unsafe { (lib.get_version)() };
        Some((v.major, v.minor))
    }
}
