use std::collections::HashMap;

use crate::lexer::Position;
use crate::types::Type;

use super::Procedure;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InstanceVariable {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GenericParameter {
    pub name: char,
    pub constraint: Type,
}

/// The per-class portion of the protocol dispatch table built in §4.D:
/// for protocol index `p` conformed to by this class, `table[p - offset]`
/// is the vector of this class' method VTIs, ordered as the protocol
/// declares its methods.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ProtocolDispatchTable {
    pub offset: usize,
    pub table: Vec<Vec<u16>>,
}

impl ProtocolDispatchTable {
    pub fn lookup(&self, protocol_index: usize, method_offset: usize) -> Option<u16> {
        let row = self.table.get(protocol_index.checked_sub(self.offset)?)?;
        row.get(method_offset).copied()
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Class {
    pub name: char,
    pub namespace: char,
    pub superclass: Option<usize>,
    pub instance_variables: Vec<InstanceVariable>,
    pub methods: HashMap<char, Procedure>,
    pub type_methods: HashMap<char, Procedure>,
    pub initializers: HashMap<char, Procedure>,
    /// A native package's `deinitializerFor` hook may also be used by
    /// user code to register cleanup; carried as an ordinary bodied
    /// procedure, invoked by the GC once per dead instance per cycle.
    pub deinitializer: Option<Procedure>,
    pub protocols: Vec<usize>,
    pub generic_parameters: Vec<GenericParameter>,
    /// Generic arguments supplied to the superclass, expressed in terms of
    /// this class' own generic parameters (by `GenericReference` index).
    pub super_generic_arguments: Vec<Type>,
    pub inherits_initializers: bool,

    pub next_method_vti: u16,
    pub next_type_method_vti: u16,
    pub next_initializer_vti: u16,

    /// Byte offset of each instance variable within the object's value
    /// area; populated alongside VTI assignment (§4.D) once the full
    /// instance-variable layout, including inherited slots, is known.
    pub instance_variable_offsets: Vec<u32>,
    pub protocol_dispatch: ProtocolDispatchTable,

    pub position: Position,
    pub doc_comment: Option<String>,
}

impl Class {
    pub fn new(name: char, namespace: char, position: Position) -> Self {
        Self {
            name,
            namespace,
            superclass: None,
            instance_variables: vec![],
            methods: HashMap::new(),
            type_methods: HashMap::new(),
            initializers: HashMap::new(),
            deinitializer: None,
            protocols: vec![],
            generic_parameters: vec![],
            super_generic_arguments: vec![],
            inherits_initializers: false,
            next_method_vti: 0,
            next_type_method_vti: 0,
            next_initializer_vti: 0,
            instance_variable_offsets: vec![],
            protocol_dispatch: ProtocolDispatchTable::default(),
            position,
            doc_comment: None,
        }
    }

    /// §9 design note: a class inherits its superclass' initializers iff
    /// it declares zero instance variables and zero initializers of its
    /// own, decided at class-body close.
    pub fn compute_inherits_initializers(&self) -> bool {
        self.instance_variables.is_empty() && self.initializers.is_empty()
    }

    pub fn total_instance_variable_count(&self, inherited: usize) -> usize {
        inherited + self.instance_variables.len()
    }
}
