//! Statement model.
//!
//! The parser lives outside this crate; it hands over an [`Application`] as a
//! JSON document that deserializes into these types. Everything here is
//! immutable once loaded.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::specifier::ResultSpecifier;
use crate::value::Value;

/// A loaded program: the full set of feature sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub feature_sets: Vec<FeatureSet>,
}

impl Application {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            feature_sets: Vec::new(),
        }
    }

    pub fn with_feature_set(mut self, feature_set: FeatureSet) -> Self {
        self.feature_sets.push(feature_set);
        self
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// A named, ordered sequence of statements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSet {
    pub name: String,
    /// Descriptive label; may encode the trigger this feature set reacts to.
    #[serde(default)]
    pub business_activity: String,
    #[serde(default)]
    pub statements: Vec<Statement>,
}

impl FeatureSet {
    pub fn new(name: impl Into<String>, business_activity: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            business_activity: business_activity.into(),
            statements: Vec::new(),
        }
    }

    pub fn with_statement(mut self, statement: impl Into<Statement>) -> Self {
        self.statements.push(statement.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Statement {
    Aro(AroStatement),
    Match(MatchStatement),
    ForEach(ForEachLoop),
}

impl From<AroStatement> for Statement {
    fn from(s: AroStatement) -> Self {
        Statement::Aro(s)
    }
}

impl From<MatchStatement> for Statement {
    fn from(s: MatchStatement) -> Self {
        Statement::Match(s)
    }
}

impl From<ForEachLoop> for Statement {
    fn from(s: ForEachLoop) -> Self {
        Statement::ForEach(s)
    }
}

// ---------------------------------------------------------------------------
// Action-Result-Object statements
// ---------------------------------------------------------------------------

/// `Action <result> <preposition> <object> [when <condition>]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AroStatement {
    /// Action verb. Looked up case-insensitively in the action registry.
    pub action: String,
    pub result: ResultDescriptor,
    pub object: ObjectDescriptor,
    #[serde(default, rename = "when", skip_serializing_if = "Option::is_none")]
    pub guard: Option<Expression>,
}

impl AroStatement {
    pub fn new(
        action: impl Into<String>,
        result: ResultDescriptor,
        preposition: Preposition,
        source: Expression,
    ) -> Self {
        Self {
            action: action.into(),
            result,
            object: ObjectDescriptor {
                preposition,
                source,
                filter: None,
            },
            guard: None,
        }
    }

    pub fn when(mut self, condition: Expression) -> Self {
        self.guard = Some(condition);
        self
    }

    /// Attach a `where` clause to the object.
    pub fn filtered(mut self, filter: Expression) -> Self {
        self.object.filter = Some(filter);
        self
    }
}

/// The binding a statement produces: `<name: qualifier>` plus a specifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
    #[serde(default, skip_serializing_if = "ResultSpecifier::is_none")]
    pub specifier: ResultSpecifier,
}

impl ResultDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualifier: None,
            specifier: ResultSpecifier::None,
        }
    }

    pub fn qualified(name: impl Into<String>, qualifier: impl Into<String>) -> Self {
        Self {
            qualifier: Some(qualifier.into()),
            ..Self::new(name)
        }
    }

    pub fn with_specifier(mut self, specifier: ResultSpecifier) -> Self {
        self.specifier = specifier;
        self
    }
}

impl fmt::Display for ResultDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "<{}: {}>", self.name, q),
            None => write!(f, "<{}>", self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    pub preposition: Preposition,
    pub source: Expression,
    /// `where` clause, used by repository queries.
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Expression>,
}

impl ObjectDescriptor {
    /// The name the object refers to, without resolving it: the variable
    /// name, or the text of a string literal.
    pub fn source_name(&self) -> Option<&str> {
        match &self.source {
            Expression::Variable { name, .. } => Some(name),
            Expression::Literal(Value::String(s)) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preposition {
    From,
    For,
    With,
    To,
    Into,
    Against,
    Via,
    On,
    At,
    By,
}

impl fmt::Display for Preposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Preposition::From => "from",
            Preposition::For => "for",
            Preposition::With => "with",
            Preposition::To => "to",
            Preposition::Into => "into",
            Preposition::Against => "against",
            Preposition::Via => "via",
            Preposition::On => "on",
            Preposition::At => "at",
            Preposition::By => "by",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Expression {
    Literal(Value),
    /// `<name: field.path>` with an optional specifier on the resolved value.
    Variable {
        name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        path: Vec<String>,
        #[serde(default, skip_serializing_if = "ResultSpecifier::is_none")]
        specifier: ResultSpecifier,
    },
    List(Vec<Expression>),
    Map(BTreeMap<String, Expression>),
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

impl Expression {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(value.into())
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expression::Variable {
            name: name.into(),
            path: Vec::new(),
            specifier: ResultSpecifier::None,
        }
    }

    /// `<name: a.b.c>`
    pub fn field(name: impl Into<String>, path: &str) -> Self {
        Expression::Variable {
            name: name.into(),
            path: path.split('.').map(str::to_string).collect(),
            specifier: ResultSpecifier::None,
        }
    }

    pub fn specified(name: impl Into<String>, specifier: ResultSpecifier) -> Self {
        Expression::Variable {
            name: name.into(),
            path: Vec::new(),
            specifier,
        }
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn not(operand: Expression) -> Self {
        Expression::Unary {
            op: UnaryOp::Not,
            operand: Box::new(operand),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    #[serde(rename = "not")]
    Not,
    #[serde(rename = "-")]
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "and")]
    And,
    #[serde(rename = "or")]
    Or,
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Rem,
    #[serde(rename = "++")]
    Concat,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "matches")]
    Matches,
}

// ---------------------------------------------------------------------------
// Control constructs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchStatement {
    pub subject: Expression,
    pub cases: Vec<MatchCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otherwise: Option<Vec<Statement>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCase {
    pub pattern: Pattern,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub guard: Option<Expression>,
    pub body: Vec<Statement>,
}

impl MatchCase {
    pub fn new(pattern: Pattern, body: Vec<Statement>) -> Self {
        Self {
            pattern,
            guard: None,
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Pattern {
    Literal(Value),
    /// Inclusive numeric range.
    Range { low: f64, high: f64 },
    Regex { pattern: String },
}

/// `for each <item> [at <index>] in <collection> [where <filter>]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForEachLoop {
    pub item: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    pub collection: Expression,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Expression>,
    pub body: Vec<Statement>,
}
