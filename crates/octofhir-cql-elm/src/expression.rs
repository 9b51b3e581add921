//! ELM expression nodes
//!
//! Nodes are allocated in an `ExprArena` owned by the library and refer to
//! each other through `ExprId` handles, so invocations can have their
//! operands replaced in place when conversions are spliced in.

use crate::model::{QName, TypeSpecifier};
use octofhir_cql_diagnostics::Locator;
use octofhir_cql_types::DataType;
use rust_decimal::Decimal;
use smallvec::SmallVec;
use std::ops::{Index, IndexMut};

/// Operand list of an invocation
pub type Operands = SmallVec<[ExprId; 2]>;

/// Handle to a node in an `ExprArena`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(usize);

impl ExprId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A typed expression node
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    /// Type assigned during translation
    pub result_type: Option<DataType>,
    pub locator: Option<Locator>,
}

/// Storage for the expression nodes of one library
#[derive(Debug, Clone, Default)]
pub struct ExprArena {
    nodes: Vec<Expr>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an untyped node
    pub fn alloc(&mut self, kind: ExprKind) -> ExprId {
        let id = ExprId(self.nodes.len());
        self.nodes.push(Expr {
            kind,
            result_type: None,
            locator: None,
        });
        id
    }

    /// Allocate a node with its result type
    pub fn alloc_typed(&mut self, kind: ExprKind, result_type: DataType) -> ExprId {
        let id = self.alloc(kind);
        self.nodes[id.0].result_type = Some(result_type);
        id
    }

    pub fn get(&self, id: ExprId) -> Option<&Expr> {
        self.nodes.get(id.0)
    }

    pub fn get_mut(&mut self, id: ExprId) -> Option<&mut Expr> {
        self.nodes.get_mut(id.0)
    }

    pub fn kind(&self, id: ExprId) -> &ExprKind {
        &self[id].kind
    }

    pub fn result_type(&self, id: ExprId) -> Option<&DataType> {
        self[id].result_type.as_ref()
    }

    pub fn set_result_type(&mut self, id: ExprId, result_type: DataType) {
        self[id].result_type = Some(result_type);
    }

    pub fn set_locator(&mut self, id: ExprId, locator: Locator) {
        self[id].locator = Some(locator);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Index<ExprId> for ExprArena {
    type Output = Expr;

    fn index(&self, id: ExprId) -> &Expr {
        &self.nodes[id.0]
    }
}

impl IndexMut<ExprId> for ExprArena {
    fn index_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.nodes[id.0]
    }
}

// ============================================================================
// Expression Kinds
// ============================================================================

/// Reference to a library-level definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedRef {
    pub library_name: Option<String>,
    pub name: String,
}

impl NamedRef {
    pub fn new(library_name: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            library_name: library_name.map(String::from),
            name: name.into(),
        }
    }
}

/// Query source bound to an alias
#[derive(Debug, Clone, PartialEq)]
pub struct AliasedQuerySource {
    pub alias: String,
    pub expression: ExprId,
}

/// Query let clause
#[derive(Debug, Clone, PartialEq)]
pub struct LetClause {
    pub identifier: String,
    pub expression: ExprId,
}

/// Query return clause
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnClause {
    pub expression: ExprId,
    pub distinct: bool,
}

/// Query expression
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub sources: Vec<AliasedQuerySource>,
    pub lets: Vec<LetClause>,
    pub where_clause: Option<ExprId>,
    pub return_clause: Option<ReturnClause>,
}

/// Interval selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalSelector {
    pub low: Option<ExprId>,
    pub high: Option<ExprId>,
    pub low_closed: bool,
    pub high_closed: bool,
    /// Closedness computed at run time
    pub low_closed_expression: Option<ExprId>,
    pub high_closed_expression: Option<ExprId>,
}

/// Node payloads
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // === Literals ===
    Null,
    Literal {
        value_type: QName,
        value: String,
    },
    Quantity {
        value: Decimal,
        unit: String,
    },

    // === References ===
    ExpressionRef(NamedRef),
    FunctionRef {
        target: NamedRef,
        operands: Operands,
    },
    ParameterRef(NamedRef),
    ValueSetRef(NamedRef),
    CodeSystemRef(NamedRef),
    CodeRef(NamedRef),
    ConceptRef(NamedRef),
    OperandRef {
        name: String,
    },
    AliasRef {
        name: String,
    },
    QueryLetRef {
        name: String,
    },
    IdentifierRef(NamedRef),
    /// Reference to an included library; only valid as the left side of an accessor
    LibraryRef {
        library_name: String,
    },
    Property {
        source: Option<ExprId>,
        path: String,
        scope: Option<String>,
    },

    // === Operators ===
    Native {
        operator: NativeOperator,
        operands: Operands,
    },
    As {
        operand: ExprId,
        as_type: Option<QName>,
        as_type_specifier: Option<TypeSpecifier>,
        strict: bool,
    },
    Convert {
        operand: ExprId,
        to_type: Option<QName>,
        to_type_specifier: Option<TypeSpecifier>,
    },

    // === Selectors ===
    List {
        elements: Vec<ExprId>,
    },
    Interval(IntervalSelector),
    Tuple {
        elements: Vec<(String, ExprId)>,
    },

    // === Queries ===
    Query(Box<Query>),
}

impl ExprKind {
    /// ELM type name of the node
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Literal { .. } => "Literal",
            Self::Quantity { .. } => "Quantity",
            Self::ExpressionRef(_) => "ExpressionRef",
            Self::FunctionRef { .. } => "FunctionRef",
            Self::ParameterRef(_) => "ParameterRef",
            Self::ValueSetRef(_) => "ValueSetRef",
            Self::CodeSystemRef(_) => "CodeSystemRef",
            Self::CodeRef(_) => "CodeRef",
            Self::ConceptRef(_) => "ConceptRef",
            Self::OperandRef { .. } => "OperandRef",
            Self::AliasRef { .. } => "AliasRef",
            Self::QueryLetRef { .. } => "QueryLetRef",
            Self::IdentifierRef(_) => "IdentifierRef",
            Self::LibraryRef { .. } => "LibraryRef",
            Self::Property { .. } => "Property",
            Self::Native { operator, .. } => operator.name(),
            Self::As { .. } => "As",
            Self::Convert { .. } => "Convert",
            Self::List { .. } => "List",
            Self::Interval(_) => "Interval",
            Self::Tuple { .. } => "Tuple",
            Self::Query(_) => "Query",
        }
    }

    /// Operands of an invocation; empty for every other node
    pub fn operands(&self) -> &[ExprId] {
        match self {
            Self::FunctionRef { operands, .. } | Self::Native { operands, .. } => operands,
            _ => &[],
        }
    }

    /// Replace the operands of an invocation
    ///
    /// Returns `false` when the node is not an invocation.
    pub fn set_operands(&mut self, new_operands: Operands) -> bool {
        match self {
            Self::FunctionRef { operands, .. } | Self::Native { operands, .. } => {
                *operands = new_operands;
                true
            }
            _ => false,
        }
    }

    /// Whether the node is an invocation
    pub fn is_invocation(&self) -> bool {
        matches!(self, Self::FunctionRef { .. } | Self::Native { .. })
    }
}

// ============================================================================
// Native Operators
// ============================================================================

/// How a native operator carries its operands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorShape {
    Unary,
    Binary,
    Nary,
    /// Single `source` list operand
    Aggregate,
}

/// Operators with a dedicated ELM node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeOperator {
    // Logical
    And,
    Or,
    Xor,
    Implies,
    Not,
    // Nullological
    IsNull,
    IsTrue,
    IsFalse,
    Coalesce,
    // Comparison
    Equal,
    NotEqual,
    Equivalent,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    TruncatedDivide,
    Modulo,
    Power,
    Log,
    Negate,
    Abs,
    Ceiling,
    Floor,
    Truncate,
    Ln,
    Exp,
    Successor,
    Predecessor,
    // String
    Concatenate,
    Length,
    Upper,
    Lower,
    StartsWith,
    EndsWith,
    Matches,
    Indexer,
    // Interval and list
    Start,
    End,
    Width,
    Contains,
    In,
    Includes,
    IncludedIn,
    Union,
    Intersect,
    Except,
    Exists,
    Flatten,
    Distinct,
    SingletonFrom,
    // Aggregates
    Count,
    Sum,
    Min,
    Max,
    Avg,
    AllTrue,
    AnyTrue,
    // Conversions
    ToBoolean,
    ToInteger,
    ToLong,
    ToDecimal,
    ToString,
    ToDate,
    ToDateTime,
    ToTime,
    ToQuantity,
    ToConcept,
    ToList,
}

impl NativeOperator {
    /// Every native operator
    pub const ALL: [NativeOperator; 73] = [
        Self::And,
        Self::Or,
        Self::Xor,
        Self::Implies,
        Self::Not,
        Self::IsNull,
        Self::IsTrue,
        Self::IsFalse,
        Self::Coalesce,
        Self::Equal,
        Self::NotEqual,
        Self::Equivalent,
        Self::Less,
        Self::Greater,
        Self::LessOrEqual,
        Self::GreaterOrEqual,
        Self::Add,
        Self::Subtract,
        Self::Multiply,
        Self::Divide,
        Self::TruncatedDivide,
        Self::Modulo,
        Self::Power,
        Self::Log,
        Self::Negate,
        Self::Abs,
        Self::Ceiling,
        Self::Floor,
        Self::Truncate,
        Self::Ln,
        Self::Exp,
        Self::Successor,
        Self::Predecessor,
        Self::Concatenate,
        Self::Length,
        Self::Upper,
        Self::Lower,
        Self::StartsWith,
        Self::EndsWith,
        Self::Matches,
        Self::Indexer,
        Self::Start,
        Self::End,
        Self::Width,
        Self::Contains,
        Self::In,
        Self::Includes,
        Self::IncludedIn,
        Self::Union,
        Self::Intersect,
        Self::Except,
        Self::Exists,
        Self::Flatten,
        Self::Distinct,
        Self::SingletonFrom,
        Self::Count,
        Self::Sum,
        Self::Min,
        Self::Max,
        Self::Avg,
        Self::AllTrue,
        Self::AnyTrue,
        Self::ToBoolean,
        Self::ToInteger,
        Self::ToLong,
        Self::ToDecimal,
        Self::ToString,
        Self::ToDate,
        Self::ToDateTime,
        Self::ToTime,
        Self::ToQuantity,
        Self::ToConcept,
        Self::ToList,
    ];

    /// Operator name as used in ELM and in the System library
    pub const fn name(&self) -> &'static str {
        match self {
            Self::And => "And",
            Self::Or => "Or",
            Self::Xor => "Xor",
            Self::Implies => "Implies",
            Self::Not => "Not",
            Self::IsNull => "IsNull",
            Self::IsTrue => "IsTrue",
            Self::IsFalse => "IsFalse",
            Self::Coalesce => "Coalesce",
            Self::Equal => "Equal",
            Self::NotEqual => "NotEqual",
            Self::Equivalent => "Equivalent",
            Self::Less => "Less",
            Self::Greater => "Greater",
            Self::LessOrEqual => "LessOrEqual",
            Self::GreaterOrEqual => "GreaterOrEqual",
            Self::Add => "Add",
            Self::Subtract => "Subtract",
            Self::Multiply => "Multiply",
            Self::Divide => "Divide",
            Self::TruncatedDivide => "TruncatedDivide",
            Self::Modulo => "Modulo",
            Self::Power => "Power",
            Self::Log => "Log",
            Self::Negate => "Negate",
            Self::Abs => "Abs",
            Self::Ceiling => "Ceiling",
            Self::Floor => "Floor",
            Self::Truncate => "Truncate",
            Self::Ln => "Ln",
            Self::Exp => "Exp",
            Self::Successor => "Successor",
            Self::Predecessor => "Predecessor",
            Self::Concatenate => "Concatenate",
            Self::Length => "Length",
            Self::Upper => "Upper",
            Self::Lower => "Lower",
            Self::StartsWith => "StartsWith",
            Self::EndsWith => "EndsWith",
            Self::Matches => "Matches",
            Self::Indexer => "Indexer",
            Self::Start => "Start",
            Self::End => "End",
            Self::Width => "Width",
            Self::Contains => "Contains",
            Self::In => "In",
            Self::Includes => "Includes",
            Self::IncludedIn => "IncludedIn",
            Self::Union => "Union",
            Self::Intersect => "Intersect",
            Self::Except => "Except",
            Self::Exists => "Exists",
            Self::Flatten => "Flatten",
            Self::Distinct => "Distinct",
            Self::SingletonFrom => "SingletonFrom",
            Self::Count => "Count",
            Self::Sum => "Sum",
            Self::Min => "Min",
            Self::Max => "Max",
            Self::Avg => "Avg",
            Self::AllTrue => "AllTrue",
            Self::AnyTrue => "AnyTrue",
            Self::ToBoolean => "ToBoolean",
            Self::ToInteger => "ToInteger",
            Self::ToLong => "ToLong",
            Self::ToDecimal => "ToDecimal",
            Self::ToString => "ToString",
            Self::ToDate => "ToDate",
            Self::ToDateTime => "ToDateTime",
            Self::ToTime => "ToTime",
            Self::ToQuantity => "ToQuantity",
            Self::ToConcept => "ToConcept",
            Self::ToList => "ToList",
        }
    }

    /// Look an operator up by name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }

    /// Operand layout of the ELM node
    pub const fn shape(&self) -> OperatorShape {
        match self {
            Self::Coalesce | Self::Concatenate => OperatorShape::Nary,
            Self::Count
            | Self::Sum
            | Self::Min
            | Self::Max
            | Self::Avg
            | Self::AllTrue
            | Self::AnyTrue => OperatorShape::Aggregate,
            Self::And
            | Self::Or
            | Self::Xor
            | Self::Implies
            | Self::Equal
            | Self::NotEqual
            | Self::Equivalent
            | Self::Less
            | Self::Greater
            | Self::LessOrEqual
            | Self::GreaterOrEqual
            | Self::Add
            | Self::Subtract
            | Self::Multiply
            | Self::Divide
            | Self::TruncatedDivide
            | Self::Modulo
            | Self::Power
            | Self::Log
            | Self::StartsWith
            | Self::EndsWith
            | Self::Matches
            | Self::Indexer
            | Self::Contains
            | Self::In
            | Self::Includes
            | Self::IncludedIn
            | Self::Union
            | Self::Intersect
            | Self::Except => OperatorShape::Binary,
            _ => OperatorShape::Unary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_operator_names_round_trip() {
        for op in NativeOperator::ALL {
            assert_eq!(NativeOperator::from_name(op.name()), Some(op));
        }
        assert_eq!(NativeOperator::from_name("Frobnicate"), None);
    }

    #[test]
    fn test_shapes() {
        assert_eq!(NativeOperator::Add.shape(), OperatorShape::Binary);
        assert_eq!(NativeOperator::ToDecimal.shape(), OperatorShape::Unary);
        assert_eq!(NativeOperator::Coalesce.shape(), OperatorShape::Nary);
        assert_eq!(NativeOperator::Count.shape(), OperatorShape::Aggregate);
    }

    #[test]
    fn test_operands_replaced_in_place() {
        let mut arena = ExprArena::new();
        let one = arena.alloc(ExprKind::Null);
        let two = arena.alloc(ExprKind::Null);
        let add = arena.alloc(ExprKind::Native {
            operator: NativeOperator::Add,
            operands: smallvec![one, two],
        });

        let wrapped = arena.alloc(ExprKind::Native {
            operator: NativeOperator::ToDecimal,
            operands: smallvec![one],
        });
        assert!(arena[add].kind.set_operands(smallvec![wrapped, two]));
        assert_eq!(arena.kind(add).operands(), &[wrapped, two]);
        assert!(!arena[one].kind.set_operands(smallvec![two]));
    }
}
