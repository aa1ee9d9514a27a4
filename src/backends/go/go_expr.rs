use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::definitions::DefinitionRegistry;
use crate::compiler_frontend::pcal::pcal_nodes::ResourceKind;
use crate::compiler_frontend::pcal::tla_expressions::{
    BinaryOperator, Expression, ExpressionKind, UnaryOperator,
};

/// Go type used for a declaration of the given resource kind.
pub fn go_type(resource: ResourceKind) -> &'static str {
    match resource {
        ResourceKind::Plain => "int",
        ResourceKind::Slice => "[]int",
        ResourceKind::Map => "map[int]int",
    }
}

/// Renders a TLA+ expression as a Go expression.
/// Binary operations are always parenthesized, so the result can be negated with a bare `!`.
pub fn lower_expression(
    expression: &Expression,
    definitions: &DefinitionRegistry,
) -> Result<String, CompilerError> {
    let go = match &expression.kind {
        ExpressionKind::Number(value) => value.to_string(),
        ExpressionKind::Bool(value) => value.to_string(),
        ExpressionKind::String(value) => format!("{value:?}"),
        ExpressionKind::Identifier(name) => name.to_owned(),

        ExpressionKind::FunctionCall { function, params } => {
            // Slices are 1-based on the TLA+ side
            let one_based = root_resource(function, definitions)? == ResourceKind::Slice;

            let mut go = lower_expression(function, definitions)?;
            for param in params {
                let index = lower_expression(param, definitions)?;
                if one_based {
                    go.push_str(&format!("[{index}-1]"));
                } else {
                    go.push_str(&format!("[{index}]"));
                }
            }
            go
        }

        ExpressionKind::BinOp { op, lhs, rhs } => format!(
            "({} {} {})",
            lower_expression(lhs, definitions)?,
            binary_operator(*op),
            lower_expression(rhs, definitions)?
        ),

        ExpressionKind::Unary { op, operand } => {
            let operand = lower_expression(operand, definitions)?;
            match op {
                UnaryOperator::Not => format!("!{operand}"),
                UnaryOperator::Negate => format!("-{operand}"),
            }
        }

        ExpressionKind::Tuple(elements) => {
            format!("[]int{{{}}}", lower_list(elements, definitions)?)
        }

        ExpressionKind::If {
            condition,
            yes,
            no,
        } => format!(
            "func() int {{ if {} {{ return {} }}; return {} }}()",
            lower_expression(condition, definitions)?,
            lower_expression(yes, definitions)?,
            lower_expression(no, definitions)?
        ),

        ExpressionKind::OperatorCall { name, args } => {
            let rendered = lower_list(args, definitions)?;
            match (name.as_str(), args.len()) {
                ("Len", 1) => format!("len({rendered})"),
                ("Append", 2) => format!("append({rendered})"),
                ("Head", 1) => format!("{rendered}[0]"),
                ("Tail", 1) => format!("{rendered}[1:]"),
                _ => format!("{name}({rendered})"),
            }
        }
    };

    Ok(go)
}

fn lower_list(
    expressions: &[Expression],
    definitions: &DefinitionRegistry,
) -> Result<String, CompilerError> {
    let rendered = expressions
        .iter()
        .map(|expression| lower_expression(expression, definitions))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rendered.join(", "))
}

// The resource kind of the variable an index chain starts from
fn root_resource(
    expression: &Expression,
    definitions: &DefinitionRegistry,
) -> Result<ResourceKind, CompilerError> {
    match &expression.kind {
        ExpressionKind::Identifier(_) => Ok(definitions.resolve(expression.uid)?.resource_kind()),
        ExpressionKind::FunctionCall { function, .. } => root_resource(function, definitions),
        _ => Ok(ResourceKind::Plain),
    }
}

fn binary_operator(op: BinaryOperator) -> &'static str {
    match op {
        BinaryOperator::Add => "+",
        BinaryOperator::Subtract => "-",
        BinaryOperator::Multiply => "*",
        BinaryOperator::Divide => "/",
        BinaryOperator::Modulo => "%",
        BinaryOperator::Equal => "==",
        BinaryOperator::NotEqual => "!=",
        BinaryOperator::LessThan => "<",
        BinaryOperator::LessThanOrEqual => "<=",
        BinaryOperator::GreaterThan => ">",
        BinaryOperator::GreaterThanOrEqual => ">=",
        BinaryOperator::And => "&&",
        BinaryOperator::Or => "||",
    }
}

#[cfg(test)]
#[path = "tests/go_expr_tests.rs"]
mod tests;
