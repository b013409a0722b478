//! Human-readable type formatting for diagnostics and tests.

use crate::db::TypeDatabase;
use crate::types::{ClassFlags, LiteralValue, TypeId, TypeKey};

/// Format a type the way annotations are written: `int | None`,
/// `tuple[int, str]`, `Literal['circle']`, `type[int]`.
pub fn format_type(db: &dyn TypeDatabase, ty: TypeId) -> String {
    match db.lookup(ty) {
        None => "<invalid>".to_string(),
        Some(TypeKey::Intrinsic(kind)) => match kind {
            crate::types::IntrinsicKind::Any => "Any".to_string(),
            crate::types::IntrinsicKind::Unknown => "Unknown".to_string(),
            crate::types::IntrinsicKind::Never => "Never".to_string(),
        },
        Some(TypeKey::None { instantiable, .. }) => {
            if instantiable {
                "type[None]".to_string()
            } else {
                "None".to_string()
            }
        }
        Some(TypeKey::Module(name)) => format!("Module(\"{}\")", db.resolve_atom(name)),
        Some(TypeKey::Class(shape_id)) => {
            let shape = db.class_shape(shape_id);
            let short = short_name(&db.resolve_atom(shape.name));
            let body = if let Some(literal) = &shape.literal {
                match literal {
                    LiteralValue::EnumMember(member) => {
                        format!("Literal[{short}.{}]", db.resolve_atom(*member))
                    }
                    _ => format!("Literal[{}]", format_literal(db, literal)),
                }
            } else if let Some(args) = &shape.tuple_args {
                if args.is_empty() {
                    format!("{short}[()]")
                } else {
                    let parts: Vec<String> = args
                        .iter()
                        .map(|arg| {
                            if arg.is_unbounded {
                                format!("{}, ...", format_type(db, arg.ty))
                            } else {
                                format_type(db, arg.ty)
                            }
                        })
                        .collect();
                    format!("{short}[{}]", parts.join(", "))
                }
            } else if let Some(args) = &shape.type_args {
                let parts: Vec<String> = args.iter().map(|&arg| format_type(db, arg)).collect();
                format!("{short}[{}]", parts.join(", "))
            } else {
                short
            };
            if shape.flags.contains(ClassFlags::INSTANTIABLE) {
                format!("type[{body}]")
            } else {
                body
            }
        }
        Some(TypeKey::Function(shape_id)) => {
            let shape = db.function_shape(shape_id);
            let params: Vec<String> = shape
                .params
                .iter()
                .map(|param| format_type(db, param.ty))
                .collect();
            format!(
                "({}) -> {}",
                params.join(", "),
                format_type(db, shape.return_type)
            )
        }
        Some(TypeKey::Overloaded(list)) => {
            let parts: Vec<String> = db
                .type_list(list)
                .iter()
                .map(|&signature| format_type(db, signature))
                .collect();
            format!("Overload[{}]", parts.join(", "))
        }
        Some(TypeKey::TypeVar(shape_id)) => {
            let shape = db.typevar_shape(shape_id);
            let name = db.resolve_atom(shape.name).to_string();
            if shape.instantiable {
                format!("type[{name}]")
            } else {
                name
            }
        }
        Some(TypeKey::Union(list)) => {
            let parts: Vec<String> = db
                .type_list(list)
                .iter()
                .map(|&member| format_type(db, member))
                .collect();
            parts.join(" | ")
        }
    }
}

fn format_literal(db: &dyn TypeDatabase, literal: &LiteralValue) -> String {
    match literal {
        LiteralValue::Bool(true) => "True".to_string(),
        LiteralValue::Bool(false) => "False".to_string(),
        LiteralValue::Int(value) => value.to_string(),
        LiteralValue::Str(atom) => format!("'{}'", db.resolve_atom(*atom)),
        LiteralValue::Bytes(atom) => format!("b'{}'", db.resolve_atom(*atom)),
        LiteralValue::EnumMember(atom) => db.resolve_atom(*atom).to_string(),
    }
}

fn short_name(qualified: &str) -> String {
    // Synthesized names ("<subclass of A and B>") are shown as-is.
    if qualified.starts_with('<') {
        return qualified.to_string();
    }
    qualified
        .rsplit('.')
        .next()
        .unwrap_or(qualified)
        .to_string()
}
