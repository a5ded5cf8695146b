//! Shared bytecode data model: the in-memory shape that both the emitter
//! (§4.E) produces and the writer/reader (§4.F/§4.G) serialize to and from
//! the byte-exact file format of §6.
mod opcode;
mod reader;
mod writer;

pub use opcode::{Instruction, PrimitiveKind, PrimitiveOp, RUNTIME_CLASS_SENTINEL};
pub use reader::{ReadError, Reader};
pub use writer::Writer;

/// The interpreter's format version. Bumped whenever the instruction
/// vocabulary or file layout changes; a reader rejects any other value.
pub const FORMAT_VERSION: u8 = 1;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CompiledFunction {
    pub name: u32,
    pub vti: u16,
    pub argument_count: u8,
    pub native: bool,
    /// `None` for native functions (the reader resolves their symbol via
    /// the package provider instead).
    pub variable_count: Option<u8>,
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ProtocolTableEntry {
    pub protocol_index: u16,
    pub method_vtis: Vec<u16>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ClassProtocolTable {
    pub min_index: u16,
    pub max_index: u16,
    pub entries: Vec<ProtocolTableEntry>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CompiledClass {
    pub name: u32,
    /// Self-index for the root class, per §6.
    pub superclass_index: u16,
    pub instance_variable_count: u16,
    pub method_vtable_size: u16,
    pub type_method_vtable_size: u16,
    pub inherits_initializers: bool,
    pub initializer_vtable_size: u16,
    pub methods: Vec<CompiledFunction>,
    pub initializers: Vec<CompiledFunction>,
    pub type_methods: Vec<CompiledFunction>,
    pub protocol_table: Option<ClassProtocolTable>,
    /// A user-declared (bodied) deinitializer, compiled like any other
    /// method. Not part of §6's literal byte layout — added as a trailing
    /// optional field so a class's own `🗑` body can actually be invoked
    /// by the GC's dead-object sweep (§4.H); native deinitializers still
    /// resolve purely through the package ABI's `deinitializerFor`, as §6
    /// specifies, and carry no bytecode of their own.
    pub deinitializer: Option<CompiledFunction>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PackageSection {
    /// The sentinel zero-length-name section: "use the host's built-in
    /// providers for the standard types".
    pub standard: bool,
    pub name: String,
    pub major: u16,
    pub minor: u16,
    pub requires_native_binary: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BytecodeFile {
    pub version: u8,
    pub packages: Vec<PackageSection>,
    pub classes: Vec<CompiledClass>,
    pub string_pool: Vec<String>,
    pub startup_class_index: u16,
    pub startup_type_method_vti: u16,
}
