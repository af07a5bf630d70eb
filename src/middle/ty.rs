//! The Mica type system: a closed sum of primitive and composite types
//! with nominal identity for named structs and structural identity for
//! functions and anonymous structs. There are no implicit conversions.

use std::rc::Rc;

use itertools::Itertools;

/// A type value. Composite payloads sit behind `Rc` so types clone
/// cheaply; identity is decided by [`Type::equals`], never by pointer.
///
/// `Invalid` is the error type: it lets checking continue after a
/// problem has been reported, and it is neither equal nor assignable to
/// anything — itself included — so one error never cascades.
#[derive(Debug, Clone)]
pub enum Type {
    Invalid,
    Void,
    Int,
    Float,
    Bool,
    String,
    Char,
    Nil,
    Array(Rc<ArrayType>),
    Struct(Rc<StructType>),
    Function(Rc<FunctionType>),
}

#[derive(Debug)]
pub struct ArrayType {
    pub element: Type,
    /// `None` for dynamic arrays
    pub size: Option<usize>,
}

#[derive(Debug)]
pub struct StructType {
    /// Empty for anonymous structs
    pub name: String,
    /// Declaration order, used for field indices and memory layout
    pub fields: Vec<StructField>,
}

#[derive(Debug)]
pub struct StructField {
    pub name: String,
    pub ty: Type,
}

impl StructType {
    /// Finds a field and its declared index by name.
    pub fn field(&self, name: &str) -> Option<(usize, &StructField)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, field)| field.name == name)
    }
}

#[derive(Debug)]
pub struct FunctionType {
    pub parameters: Vec<Type>,
    pub return_type: Type,
}

impl Type {
    pub fn array(element: Type, size: Option<usize>) -> Type {
        Type::Array(Rc::new(ArrayType { element, size }))
    }

    pub fn strukt(name: impl Into<String>, fields: Vec<StructField>) -> Type {
        Type::Struct(Rc::new(StructType {
            name: name.into(),
            fields,
        }))
    }

    pub fn function(parameters: Vec<Type>, return_type: Type) -> Type {
        Type::Function(Rc::new(FunctionType {
            parameters,
            return_type,
        }))
    }

    /// Type identity.
    ///
    /// Primitives are equal to the same kind; arrays require equal
    /// element types and sizes; named structs compare by name, anonymous
    /// ones by ordered fields; functions compare arity, then parameters
    /// pairwise, then the return type. `Invalid` equals nothing.
    pub fn equals(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Invalid, _) | (_, Type::Invalid) => false,
            (Type::Void, Type::Void)
            | (Type::Int, Type::Int)
            | (Type::Float, Type::Float)
            | (Type::Bool, Type::Bool)
            | (Type::String, Type::String)
            | (Type::Char, Type::Char)
            | (Type::Nil, Type::Nil) => true,
            (Type::Array(a), Type::Array(b)) => {
                a.size == b.size && a.element.equals(&b.element)
            }
            (Type::Struct(a), Type::Struct(b)) => {
                if !a.name.is_empty() && !b.name.is_empty() {
                    return a.name == b.name;
                }
                a.fields.len() == b.fields.len()
                    && a.fields
                        .iter()
                        .zip(&b.fields)
                        .all(|(x, y)| x.name == y.name && x.ty.equals(&y.ty))
            }
            (Type::Function(a), Type::Function(b)) => {
                a.parameters.len() == b.parameters.len()
                    && a.parameters
                        .iter()
                        .zip(&b.parameters)
                        .all(|(x, y)| x.equals(y))
                    && a.return_type.equals(&b.return_type)
            }
            _ => false,
        }
    }

    /// Whether a value of this type can be assigned to `target`.
    /// Identical types assign; `Nil` additionally assigns to arrays and
    /// structs. There are no implicit numeric conversions.
    pub fn assignable_to(&self, target: &Type) -> bool {
        match (self, target) {
            (Type::Invalid, _) | (_, Type::Invalid) => false,
            (Type::Void, _) => false,
            (Type::Nil, Type::Array(_) | Type::Struct(_)) => true,
            _ => self.equals(target),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    /// Usable with `==` and `!=`.
    pub fn is_comparable(&self) -> bool {
        matches!(
            self,
            Type::Int | Type::Float | Type::Bool | Type::String | Type::Char
        )
    }

    /// Usable with `<`, `<=`, `>`, `>=`.
    pub fn is_ordered(&self) -> bool {
        matches!(self, Type::Int | Type::Float | Type::String | Type::Char)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Type::Bool)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Type::Invalid)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Invalid => f.write_str("<invalid>"),
            Type::Void => f.write_str("void"),
            Type::Int => f.write_str("int"),
            Type::Float => f.write_str("float"),
            Type::Bool => f.write_str("bool"),
            Type::String => f.write_str("string"),
            Type::Char => f.write_str("char"),
            Type::Nil => f.write_str("nil"),
            Type::Array(array) => match array.size {
                Some(size) => write!(f, "[{size}]{}", array.element),
                None => write!(f, "[]{}", array.element),
            },
            Type::Struct(strukt) => {
                if !strukt.name.is_empty() {
                    return write!(f, "struct {}", strukt.name);
                }
                write!(
                    f,
                    "struct {{{}}}",
                    strukt
                        .fields
                        .iter()
                        .map(|field| format!("{} {}", field.name, field.ty))
                        .join("; ")
                )
            }
            Type::Function(function) => {
                write!(
                    f,
                    "func({}) {}",
                    function.parameters.iter().map(|p| p.to_string()).join(", "),
                    function.return_type
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> Type {
        Type::strukt(
            "Point",
            vec![
                StructField {
                    name: "x".into(),
                    ty: Type::Int,
                },
                StructField {
                    name: "y".into(),
                    ty: Type::Int,
                },
            ],
        )
    }

    #[test]
    fn equals_is_reflexive_symmetric_transitive_on_valid_types() {
        let samples = [
            Type::Int,
            Type::Bool,
            Type::array(Type::Int, Some(3)),
            point(),
            Type::function(vec![Type::Int], Type::Int),
        ];

        for a in &samples {
            assert!(a.equals(a), "{a} should equal itself");
            for b in &samples {
                assert_eq!(a.equals(b), b.equals(a));
            }
        }
    }

    #[test]
    fn invalid_is_never_equal_or_assignable() {
        assert!(!Type::Invalid.equals(&Type::Invalid));
        assert!(!Type::Invalid.assignable_to(&Type::Invalid));
        assert!(!Type::Invalid.assignable_to(&Type::Int));
        assert!(!Type::Int.assignable_to(&Type::Invalid));
    }

    #[test]
    fn no_implicit_numeric_conversions() {
        assert!(!Type::Int.equals(&Type::Float));
        assert!(!Type::Int.assignable_to(&Type::Float));
        assert!(!Type::Float.assignable_to(&Type::Int));
    }

    #[test]
    fn arrays_compare_element_and_size() {
        assert!(Type::array(Type::Int, Some(3)).equals(&Type::array(Type::Int, Some(3))));
        assert!(!Type::array(Type::Int, Some(3)).equals(&Type::array(Type::Int, Some(4))));
        assert!(!Type::array(Type::Int, Some(3)).equals(&Type::array(Type::Float, Some(3))));
        assert!(!Type::array(Type::Int, None).equals(&Type::array(Type::Int, Some(3))));
    }

    #[test]
    fn named_structs_are_nominal() {
        let other = Type::strukt(
            "Position",
            vec![
                StructField {
                    name: "x".into(),
                    ty: Type::Int,
                },
                StructField {
                    name: "y".into(),
                    ty: Type::Int,
                },
            ],
        );

        // Identical shapes, different names
        assert!(!point().equals(&other));
        assert!(point().equals(&point()));
    }

    #[test]
    fn anonymous_structs_are_structural() {
        let a = Type::strukt(
            "",
            vec![StructField {
                name: "x".into(),
                ty: Type::Int,
            }],
        );
        let b = Type::strukt(
            "",
            vec![StructField {
                name: "x".into(),
                ty: Type::Int,
            }],
        );

        assert!(a.equals(&b));
    }

    #[test]
    fn functions_compare_arity_before_parameters() {
        let unary = Type::function(vec![Type::Int], Type::Int);
        let binary = Type::function(vec![Type::Int, Type::Int], Type::Int);
        let other_return = Type::function(vec![Type::Int], Type::Void);

        assert!(!unary.equals(&binary));
        assert!(!unary.equals(&other_return));
        assert!(unary.equals(&Type::function(vec![Type::Int], Type::Int)));
    }

    #[test]
    fn nil_assigns_to_arrays_and_structs_only() {
        assert!(Type::Nil.assignable_to(&Type::array(Type::Int, None)));
        assert!(Type::Nil.assignable_to(&point()));
        assert!(!Type::Nil.assignable_to(&Type::Int));
        assert!(!Type::Nil.assignable_to(&Type::String));
        assert!(!Type::Nil.assignable_to(&Type::function(vec![], Type::Void)));
    }

    #[test]
    fn assignability_is_reflexive_on_valid_types() {
        for ty in [Type::Int, Type::Bool, point(), Type::array(Type::Char, Some(2))] {
            assert!(ty.assignable_to(&ty), "{ty} should assign to itself");
        }
    }

    #[test]
    fn classifier_predicates() {
        assert!(Type::Int.is_numeric() && Type::Float.is_numeric());
        assert!(!Type::Bool.is_numeric());

        assert!(Type::Bool.is_comparable());
        assert!(!Type::Bool.is_ordered());
        assert!(Type::String.is_ordered());

        assert!(Type::Int.is_integer());
        assert!(!Type::Float.is_integer());
    }

    #[test]
    fn display_forms() {
        assert_eq!(Type::Int.to_string(), "int");
        assert_eq!(Type::Invalid.to_string(), "<invalid>");
        assert_eq!(Type::array(Type::Int, Some(3)).to_string(), "[3]int");
        assert_eq!(Type::array(Type::Int, None).to_string(), "[]int");
        assert_eq!(point().to_string(), "struct Point");
        assert_eq!(
            Type::function(vec![Type::Int, Type::Bool], Type::Void).to_string(),
            "func(int, bool) void"
        );
    }
}
