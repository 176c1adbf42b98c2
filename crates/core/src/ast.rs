//! Shared tree types for PTUScript.
//!
//! These types are produced by the parser and consumed by rendering,
//! JSON export and any tool that walks a parsed test plan. They live here
//! so that consumers can import them without depending on the parser.
//!
//! Every node carries a [`Span`]. Opaque payloads (native code, IF
//! conditions, FORMAT specs, LOOP counts, STUB call lists) are stored as
//! the raw source text and never interpreted.

use serde::Serialize;

// ──────────────────────────────────────────────
// Spans
// ──────────────────────────────────────────────

/// Byte range in the source text plus the 1-based line of its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
    pub line: u32,
}

impl Span {
    pub fn new(start: u32, end: u32, line: u32) -> Self {
        Span { start, end, line }
    }

    /// Span covering `self` through `other`, keeping the first line.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: self.line,
        }
    }
}

// ──────────────────────────────────────────────
// Expressions
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Deref,
    AddressOf,
    Not,
    Negate,
    BitNot,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Deref => "*",
            UnaryOp::AddressOf => "&",
            UnaryOp::Not => "!",
            UnaryOp::Negate => "-",
            UnaryOp::BitNot => "~",
        }
    }
}

/// Infix operators. All share one binding strength and associate left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Gt => ">",
            BinaryOp::Lt => "<",
            BinaryOp::Ge => ">=",
            BinaryOp::Le => "<=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
}

impl AssignOp {
    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::AddAssign => "+=",
            AssignOp::SubAssign => "-=",
        }
    }
}

/// A value-position expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expression {
    Identifier {
        name: String,
        span: Span,
    },
    /// Raw literal text, e.g. `0x1F`, `1.5e3`, `10%`
    Number {
        text: String,
        span: Span,
    },
    /// `raw` keeps the quotes and escapes, `value` has escapes resolved
    String {
        raw: String,
        value: String,
        span: Span,
    },
    CharLiteral {
        raw: String,
        span: Span,
    },
    Parenthesized {
        inner: Box<Expression>,
        span: Span,
    },
    Call {
        function: Box<Expression>,
        arguments: Vec<Expression>,
        span: Span,
    },
    Subscript {
        argument: Box<Expression>,
        index: Box<Expression>,
        span: Span,
    },
    /// `argument.field`, or `argument->field` when `arrow` is set
    FieldAccess {
        argument: Box<Expression>,
        field: String,
        arrow: bool,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
        span: Span,
    },
    Assignment {
        op: AssignOp,
        target: Box<Expression>,
        value: Box<Expression>,
        span: Span,
    },
    Range {
        start: Box<Expression>,
        end: Box<Expression>,
        span: Span,
    },
}

impl Expression {
    pub fn span(&self) -> Span {
        match self {
            Expression::Identifier { span, .. }
            | Expression::Number { span, .. }
            | Expression::String { span, .. }
            | Expression::CharLiteral { span, .. }
            | Expression::Parenthesized { span, .. }
            | Expression::Call { span, .. }
            | Expression::Subscript { span, .. }
            | Expression::FieldAccess { span, .. }
            | Expression::Unary { span, .. }
            | Expression::Binary { span, .. }
            | Expression::Assignment { span, .. }
            | Expression::Range { span, .. } => *span,
        }
    }

    /// Whether the expression may appear on the left of `=`, `+=` or `-=`.
    pub fn is_assignable(&self) -> bool {
        match self {
            Expression::Identifier { .. }
            | Expression::Subscript { .. }
            | Expression::FieldAccess { .. } => true,
            Expression::Unary { op, .. } => *op == UnaryOp::Deref,
            Expression::Parenthesized { inner, .. } => inner.is_assignable(),
            _ => false,
        }
    }
}

// ──────────────────────────────────────────────
// Variable instructions
// ──────────────────────────────────────────────

/// How a VAR/ARRAY/STR variable is initialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InitSpec {
    /// INIT = expr
    Expression { value: Expression, span: Span },
    /// INIT IN { expr, ... }
    InSet { values: Vec<Expression>, span: Span },
    /// INIT (vars) WITH { exprs }
    PairedWith {
        variables: Vec<Expression>,
        values: Vec<Expression>,
        span: Span,
    },
    /// INIT FROM a TO b [STEP s | NB_TIMES n | NB_RANDOM n [BOUNDS]]
    RangeSweep {
        from: Expression,
        to: Expression,
        sweep: Option<Sweep>,
        span: Span,
    },
    /// INIT ==
    ReferenceCopy { span: Span },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Sweep {
    Step { step: Expression },
    Count { count: Expression },
    Random { count: Expression, bounds: bool },
}

/// What value a VAR/ARRAY/STR variable is expected to hold.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpectedSpec {
    /// EV = expr
    ExactValue { value: Expression, span: Span },
    /// EV = expr, DELTA = tolerance[%]
    ValueWithDelta {
        value: Expression,
        delta: Expression,
        percent: bool,
        span: Span,
    },
    /// MIN = a, MAX = b
    MinMax {
        min: Expression,
        max: Expression,
        span: Span,
    },
    /// EV IN { expr, ... }
    InSet { values: Vec<Expression>, span: Span },
    /// EV (var) IN { expr, ... }
    IndirectInSet {
        variable: Expression,
        values: Vec<Expression>,
        span: Span,
    },
    /// EV ==
    ReferenceCheck { span: Span },
}

/// The keyword spelling a variable instruction was written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VarKind {
    Var,
    Array,
    Str,
}

impl VarKind {
    pub fn keyword(self) -> &'static str {
        match self {
            VarKind::Var => "VAR",
            VarKind::Array => "ARRAY",
            VarKind::Str => "STR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum VarForm {
    /// variable, INIT ..., EV/MIN ...
    Triplet {
        variable: Expression,
        init: InitSpec,
        expected: ExpectedSpec,
    },
    /// variable, EV/MIN ... (no initialization)
    Checked {
        variable: Expression,
        expected: ExpectedSpec,
    },
    /// Legacy form without INIT/EV keywords: expression, expected expression
    Doublet {
        expression: Expression,
        expected: Expression,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarInstruction {
    #[serde(rename = "keyword")]
    pub kind: VarKind,
    #[serde(flatten)]
    pub form: VarForm,
    pub span: Span,
}

impl VarInstruction {
    /// The variable (or legacy expression) the instruction is about.
    pub fn variable(&self) -> &Expression {
        match &self.form {
            VarForm::Triplet { variable, .. } | VarForm::Checked { variable, .. } => variable,
            VarForm::Doublet { expression, .. } => expression,
        }
    }
}

// ──────────────────────────────────────────────
// Stubs
// ──────────────────────────────────────────────

/// Direction of a stub parameter: `_in`, `_out`, `_inout` or `_no`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamMode {
    #[default]
    In,
    Out,
    InOut,
    No,
}

impl ParamMode {
    pub fn marker(self) -> &'static str {
        match self {
            ParamMode::In => "_in",
            ParamMode::Out => "_out",
            ParamMode::InOut => "_inout",
            ParamMode::No => "_no",
        }
    }

    /// Markers are lower-case only, unlike keywords.
    pub fn from_marker(word: &str) -> Option<ParamMode> {
        [ParamMode::In, ParamMode::Out, ParamMode::InOut, ParamMode::No]
            .into_iter()
            .find(|m| m.marker() == word)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StubParameter {
    pub mode: ParamMode,
    pub value: Expression,
}

/// `[return-type] function(params)` as written on a DEFINE STUB body line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StubCallSignature {
    pub return_type: Option<Expression>,
    pub function: Expression,
    pub parameters: Vec<StubParameter>,
    pub span: Span,
}

// ──────────────────────────────────────────────
// Definitions
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeMarker {
    Hash,
    At,
}

impl NativeMarker {
    pub fn as_str(self) -> &'static str {
        match self {
            NativeMarker::Hash => "#",
            NativeMarker::At => "@",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentMarker {
    Dash,
    Plus,
}

impl CommentMarker {
    pub fn as_str(self) -> &'static str {
        match self {
            CommentMarker::Dash => "--",
            CommentMarker::Plus => "++",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludeKind {
    Code,
    Ptu,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NativeCode {
    pub marker: NativeMarker,
    /// Everything after the marker, verbatim.
    pub content: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Header {
    pub module: Option<String>,
    pub version: Option<String>,
    pub plan: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncludePath {
    /// Path text with string escapes resolved.
    pub text: String,
    pub quoted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Include {
    #[serde(rename = "include_kind")]
    pub kind: Option<IncludeKind>,
    pub path: IncludePath,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StubDeclaration {
    pub stub: Option<String>,
    pub function: String,
    /// Opaque call list following the function name.
    pub calls: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StubCode {
    pub marker: NativeMarker,
    pub signature: StubCallSignature,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Use {
    pub name: String,
    pub arguments: Vec<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefineStub {
    pub stub: Option<String>,
    pub function: String,
    pub dimension: Option<u32>,
    pub body: Vec<Definition>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Element {
    pub children: Vec<Definition>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Environment {
    pub name: String,
    pub parameters: Vec<String>,
    pub children: Vec<Definition>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IfElse {
    /// Native boolean expression, kept verbatim.
    pub condition: String,
    pub consequence: Vec<Definition>,
    pub alternative: Option<Vec<Definition>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Simul {
    pub consequence: Vec<Definition>,
    pub alternative: Option<Vec<Definition>>,
    pub span: Span,
}

/// INITIALIZATION and TERMINATION bodies: native code lines only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NativeBlock {
    pub children: Vec<Definition>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Service {
    pub name: String,
    pub children: Vec<Definition>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Test {
    pub name: String,
    /// Native integer expression after LOOP, kept verbatim.
    pub loop_count: Option<String>,
    pub children: Vec<Definition>,
    pub span: Span,
}

/// Any instruction or block.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Definition {
    Begin {
        span: Span,
    },
    Comment {
        text: String,
        span: Span,
    },
    OtherComment {
        marker: CommentMarker,
        text: String,
        span: Span,
    },
    Header(Header),
    DefineStub(DefineStub),
    Element(Element),
    Environment(Environment),
    Family {
        names: Vec<String>,
        span: Span,
    },
    Format {
        field: String,
        format: String,
        span: Span,
    },
    IfElse(IfElse),
    Include(Include),
    Initialization(NativeBlock),
    NextTest {
        loop_count: Option<String>,
        span: Span,
    },
    Service(Service),
    ServiceType {
        names: Vec<String>,
        span: Span,
    },
    Simul(Simul),
    StubDeclaration(StubDeclaration),
    StubCode(StubCode),
    Termination(NativeBlock),
    Test(Test),
    Use(Use),
    Var(VarInstruction),
    NativeCode(NativeCode),
    /// Bare name line inside ELEMENT or ENVIRONMENT.
    Identifier {
        name: String,
        span: Span,
    },
    /// Placeholder for a definition that failed to parse.
    Error {
        span: Span,
    },
}

impl Definition {
    pub fn span(&self) -> Span {
        match self {
            Definition::Begin { span }
            | Definition::Comment { span, .. }
            | Definition::OtherComment { span, .. }
            | Definition::Family { span, .. }
            | Definition::Format { span, .. }
            | Definition::NextTest { span, .. }
            | Definition::ServiceType { span, .. }
            | Definition::Identifier { span, .. }
            | Definition::Error { span } => *span,
            Definition::Header(h) => h.span,
            Definition::DefineStub(d) => d.span,
            Definition::Element(e) => e.span,
            Definition::Environment(e) => e.span,
            Definition::IfElse(b) => b.span,
            Definition::Include(i) => i.span,
            Definition::Initialization(b) | Definition::Termination(b) => b.span,
            Definition::Service(s) => s.span,
            Definition::Simul(s) => s.span,
            Definition::StubDeclaration(s) => s.span,
            Definition::StubCode(s) => s.span,
            Definition::Test(t) => t.span,
            Definition::Use(u) => u.span,
            Definition::Var(v) => v.span,
            Definition::NativeCode(n) => n.span,
        }
    }

    /// Upper-case name of the construct, as an outline would show it.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Definition::Begin { .. } => "BEGIN",
            Definition::Comment { .. } => "COMMENT",
            Definition::OtherComment { .. } => "OTHER_COMMENT",
            Definition::Header(_) => "HEADER",
            Definition::DefineStub(_) => "DEFINE STUB",
            Definition::Element(_) => "ELEMENT",
            Definition::Environment(_) => "ENVIRONMENT",
            Definition::Family { .. } => "FAMILY",
            Definition::Format { .. } => "FORMAT",
            Definition::IfElse(_) => "IF",
            Definition::Include(_) => "INCLUDE",
            Definition::Initialization(_) => "INITIALIZATION",
            Definition::NextTest { .. } => "NEXT_TEST",
            Definition::Service(_) => "SERVICE",
            Definition::ServiceType { .. } => "SERVICE_TYPE",
            Definition::Simul(_) => "SIMUL",
            Definition::StubDeclaration(_) => "STUB",
            Definition::StubCode(_) => "STUB_CODE",
            Definition::Termination(_) => "TERMINATION",
            Definition::Test(_) => "TEST",
            Definition::Use(_) => "USE",
            Definition::Var(v) => v.kind.keyword(),
            Definition::NativeCode(_) => "NATIVE_CODE",
            Definition::Identifier { .. } => "IDENTIFIER",
            Definition::Error { .. } => "ERROR",
        }
    }

    fn child_lists(&self) -> [&[Definition]; 2] {
        const NONE: &[Definition] = &[];
        match self {
            Definition::DefineStub(d) => [d.body.as_slice(), NONE],
            Definition::Element(e) => [e.children.as_slice(), NONE],
            Definition::Environment(e) => [e.children.as_slice(), NONE],
            Definition::IfElse(b) => [
                b.consequence.as_slice(),
                b.alternative.as_deref().unwrap_or(NONE),
            ],
            Definition::Simul(s) => [
                s.consequence.as_slice(),
                s.alternative.as_deref().unwrap_or(NONE),
            ],
            Definition::Initialization(b) | Definition::Termination(b) => {
                [b.children.as_slice(), NONE]
            }
            Definition::Service(s) => [s.children.as_slice(), NONE],
            Definition::Test(t) => [t.children.as_slice(), NONE],
            _ => [NONE, NONE],
        }
    }

    /// Nested definitions in source order (both branches for IF/SIMUL).
    pub fn children(&self) -> impl Iterator<Item = &Definition> {
        self.child_lists().into_iter().flatten()
    }
}

/// Root of a parsed source unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceFile {
    pub source_id: String,
    pub definitions: Vec<Definition>,
}

impl SourceFile {
    /// Depth-first pre-order visit; top-level definitions have depth 0.
    pub fn walk<F: FnMut(&Definition, usize)>(&self, mut visit: F) {
        fn go<F: FnMut(&Definition, usize)>(defs: &[Definition], depth: usize, visit: &mut F) {
            for d in defs {
                visit(d, depth);
                for list in d.child_lists() {
                    go(list, depth + 1, visit);
                }
            }
        }
        go(&self.definitions, 0, &mut visit);
    }
}

// ──────────────────────────────────────────────
// Nesting table
// ──────────────────────────────────────────────

/// Context a definition list is parsed in. IF and SIMUL branches reuse the
/// context of the block that contains them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    SourceFile,
    Test,
    Element,
    Environment,
    Service,
    DefineStub,
    Initialization,
    Termination,
}

/// Classification of a definition for the nesting table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildKind {
    Native,
    StubCode,
    Comment,
    Begin,
    DefineStub,
    Element,
    Environment,
    Family,
    Format,
    Header,
    IfElse,
    Simul,
    Include,
    Initialization,
    NextTest,
    Service,
    ServiceType,
    Stub,
    Termination,
    Test,
    Use,
    Var,
    Identifier,
}

use ChildKind as C;

const SOURCE_FILE_CHILDREN: &[ChildKind] = &[
    C::Native,
    C::Comment,
    C::Begin,
    C::DefineStub,
    C::Element,
    C::Environment,
    C::Family,
    C::Format,
    C::Header,
    C::IfElse,
    C::Simul,
    C::Include,
    C::Initialization,
    C::NextTest,
    C::Service,
    C::Stub,
    C::Termination,
    C::Test,
    C::Use,
    C::Var,
];

const TEST_CHILDREN: &[ChildKind] = &[
    C::Element,
    C::Family,
    C::NextTest,
    C::IfElse,
    C::Simul,
    C::Comment,
    C::Var,
    C::Native,
    C::Use,
];

const ELEMENT_CHILDREN: &[ChildKind] = &[
    C::Native,
    C::Comment,
    C::Var,
    C::Stub,
    C::IfElse,
    C::Simul,
    C::Use,
    C::Identifier,
];

const ENVIRONMENT_CHILDREN: &[ChildKind] = &[
    C::Native,
    C::Comment,
    C::Var,
    C::Stub,
    C::Format,
    C::IfElse,
    C::Simul,
    C::Identifier,
];

const SERVICE_CHILDREN: &[ChildKind] = &[
    C::ServiceType,
    C::Test,
    C::Environment,
    C::Comment,
    C::Native,
    C::IfElse,
    C::Simul,
    C::Var,
    C::Use,
];

const DEFINE_STUB_CHILDREN: &[ChildKind] = &[C::StubCode, C::Comment, C::IfElse, C::Simul];

const NATIVE_ONLY: &[ChildKind] = &[C::Native];

impl BlockKind {
    pub fn allowed_children(self) -> &'static [ChildKind] {
        match self {
            BlockKind::SourceFile => SOURCE_FILE_CHILDREN,
            BlockKind::Test => TEST_CHILDREN,
            BlockKind::Element => ELEMENT_CHILDREN,
            BlockKind::Environment => ENVIRONMENT_CHILDREN,
            BlockKind::Service => SERVICE_CHILDREN,
            BlockKind::DefineStub => DEFINE_STUB_CHILDREN,
            BlockKind::Initialization | BlockKind::Termination => NATIVE_ONLY,
        }
    }

    pub fn admits(self, child: ChildKind) -> bool {
        self.allowed_children().contains(&child)
    }

    pub fn name(self) -> &'static str {
        match self {
            BlockKind::SourceFile => "the top level",
            BlockKind::Test => "TEST",
            BlockKind::Element => "ELEMENT",
            BlockKind::Environment => "ENVIRONMENT",
            BlockKind::Service => "SERVICE",
            BlockKind::DefineStub => "DEFINE STUB",
            BlockKind::Initialization => "INITIALIZATION",
            BlockKind::Termination => "TERMINATION",
        }
    }
}
