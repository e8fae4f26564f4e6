//! The tree handed to the compiler.
//!
//! Nodes are plain data: the reader builds them from source text, but anything
//! (tests, embedders) can build them directly.
use core::fmt;

use arbitrary::{Arbitrary, Unstructured};

/// Any possible Ast node
#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    Number(f64),
    String(Box<str>),
    Symbol(Box<str>),
    List(Vec<Ast>),
}

impl Ast {
    pub fn number(value: f64) -> Self {
        Self::Number(value)
    }

    pub fn string(value: impl AsRef<str>) -> Self {
        Self::String(Box::from(value.as_ref()))
    }

    pub fn symbol(name: impl AsRef<str>) -> Self {
        Self::Symbol(Box::from(name.as_ref()))
    }

    pub fn list(items: impl IntoIterator<Item = Ast>) -> Self {
        Self::List(items.into_iter().collect())
    }

    /// Wraps a whole program into the implicit top-level block
    pub fn program(body: impl IntoIterator<Item = Ast>) -> Self {
        Self::List(
            std::iter::once(Self::symbol("begin"))
                .chain(body)
                .collect(),
        )
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Self::Symbol(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Ast]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Get the head symbol, if this is a list that starts with one
    pub fn head_symbol(&self) -> Option<&str> {
        self.as_list()?.first()?.as_symbol()
    }

    /// Is this a `(var ...)` form
    pub fn is_declaration(&self) -> bool {
        self.head_symbol() == Some("var")
    }
}

impl fmt::Display for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ast::Number(n) => write!(f, "{n}"),
            Ast::String(s) => write!(f, "{s:?}"),
            Ast::Symbol(s) => write!(f, "{s}"),
            Ast::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

// Generated trees are biased towards forms the compiler understands, over a small
// set of variable names, so that most of them compile and can be run.
const VARIABLES: [&str; 4] = ["a", "b", "c", "THE_ANSWER"];
const OPERATORS: [&str; 11] = ["+", "-", "*", "/", "%", "<", ">", "==", "<=", ">=", "!="];

fn arbitrary_expr(u: &mut Unstructured<'_>, depth: u32) -> arbitrary::Result<Ast> {
    if depth == 0 || u.ratio(1, 3)? {
        return Ok(match u.int_in_range(0..=3)? {
            0 => Ast::Number(f64::from(u.int_in_range(-100i32..=100)?)),
            1 => Ast::string(*u.choose(&["", "jelly", "Hello "])?),
            2 => Ast::symbol(*u.choose(&["true", "false"])?),
            _ => Ast::symbol(*u.choose(&VARIABLES)?),
        });
    }

    let depth = depth - 1;
    Ok(match u.int_in_range(0..=6)? {
        0 => Ast::list([
            Ast::symbol(*u.choose(&OPERATORS)?),
            arbitrary_expr(u, depth)?,
            arbitrary_expr(u, depth)?,
        ]),
        1 => {
            let mut form = vec![
                Ast::symbol("if"),
                arbitrary_expr(u, depth)?,
                arbitrary_expr(u, depth)?,
            ];
            if u.arbitrary()? {
                form.push(arbitrary_expr(u, depth)?);
            }
            Ast::List(form)
        }
        2 => Ast::list([
            Ast::symbol("while"),
            arbitrary_expr(u, depth)?,
            arbitrary_expr(u, depth)?,
        ]),
        3 => Ast::list([
            Ast::symbol("for"),
            arbitrary_expr(u, depth)?,
            arbitrary_expr(u, depth)?,
            arbitrary_expr(u, depth)?,
            arbitrary_expr(u, depth)?,
        ]),
        4 => Ast::list([
            Ast::symbol("var"),
            Ast::symbol(*u.choose(&VARIABLES[..3])?),
            arbitrary_expr(u, depth)?,
        ]),
        5 => Ast::list([
            Ast::symbol("set"),
            Ast::symbol(*u.choose(&VARIABLES)?),
            arbitrary_expr(u, depth)?,
        ]),
        _ => {
            let len = u.int_in_range(0..=4)?;
            let mut block = vec![Ast::symbol("begin")];
            for _ in 0..len {
                block.push(arbitrary_expr(u, depth)?);
            }
            Ast::List(block)
        }
    })
}

impl<'a> Arbitrary<'a> for Ast {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        arbitrary_expr(u, 4)
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::Ast;

    #[test]
    fn program_wraps_in_begin() {
        let program = Ast::program([Ast::number(1.0), Ast::symbol("x")]);
        check!(program.head_symbol() == Some("begin"));
        check!(program.to_string() == "(begin 1 x)");
    }

    #[test]
    fn declarations() {
        let decl = Ast::list([Ast::symbol("var"), Ast::symbol("x"), Ast::number(1.0)]);
        check!(decl.is_declaration());
        check!(!Ast::list([Ast::symbol("set"), Ast::symbol("x")]).is_declaration());
        check!(!Ast::symbol("var").is_declaration());
        check!(!Ast::list([]).is_declaration());
    }

    #[test]
    fn display_renders_source_text() {
        let ast = Ast::list([
            Ast::symbol("+"),
            Ast::string("Hello \"you\""),
            Ast::number(2.5),
        ]);
        check!(ast.to_string() == r#"(+ "Hello \"you\"" 2.5)"#);
    }
}
