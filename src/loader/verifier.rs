//! # Bytecode Verifier
//!
//! Checks a decoded unit before any of it runs. After verification every index an
//! instruction carries is in bounds and every chunk ends in an instruction that
//! leaves it, so the machine never reads past the end of a table.

use super::LoadError;
use crate::compiler::{Chunk, Constant, Instruction, MethodDef, TypeDef, Unit};

/// Verifies every chunk of a unit
pub fn verify(unit: &Unit) -> Result<(), LoadError> {
    for def in &unit.types {
        if def.constructor.arity > def.fields.len() {
            return Err(invalid(
                def,
                &def.constructor,
                format!(
                    "constructor takes {} parameters but the type has {} fields",
                    def.constructor.arity,
                    def.fields.len()
                ),
            ));
        }
        verify_method(unit, def, &def.constructor)?;
        for method in &def.methods {
            verify_method(unit, def, method)?;
        }
    }
    Ok(())
}

fn invalid(def: &TypeDef, method: &MethodDef, message: String) -> LoadError {
    LoadError::InvalidBytecode {
        location: format!("{}.{}", def.name, method.name),
        message,
    }
}

fn verify_method(unit: &Unit, def: &TypeDef, method: &MethodDef) -> Result<(), LoadError> {
    let chunk: &Chunk = &method.chunk;

    if chunk.locals < method.arity {
        return Err(invalid(
            def,
            method,
            format!("{} locals cannot hold {} parameters", chunk.locals, method.arity),
        ));
    }

    match chunk.code.last() {
        Some(Instruction::Return | Instruction::Jump(_) | Instruction::Throw) => {}
        _ => {
            return Err(invalid(
                def,
                method,
                "chunk does not end with a terminating instruction".to_string(),
            ))
        }
    }

    for (offset, instruction) in chunk.code.iter().enumerate() {
        let check = |ok: bool, what: &str| {
            if ok {
                Ok(())
            } else {
                Err(invalid(
                    def,
                    method,
                    format!("{} out of range at offset {} ({:?})", what, offset, instruction),
                ))
            }
        };

        if let Some(target) = instruction.target() {
            check(target < chunk.code.len(), "jump target")?;
        }

        match *instruction {
            Instruction::Const(index) => check(index < unit.constants.len(), "constant")?,
            Instruction::LoadLocal(slot) | Instruction::StoreLocal(slot) => {
                check(slot < chunk.locals, "local slot")?
            }
            Instruction::EnterTry { slot, .. } => check(slot < chunk.locals, "handler slot")?,
            Instruction::LoadField(index) | Instruction::StoreField(index) => {
                check(index < def.fields.len(), "field")?
            }
            Instruction::GetMember(name) | Instruction::CallMember { name, .. } => check(
                matches!(unit.constants.get(name), Some(Constant::Str(_))),
                "member name constant",
            )?,
            Instruction::CallMethod { method: index, argc } => {
                let callee = def.methods.get(index);
                check(callee.is_some(), "method")?;
                check(callee.map(|m| m.arity) == Some(argc), "method argument count")?;
            }
            Instruction::CallImport { import, .. } => {
                check(import < unit.imports.len(), "import")?
            }
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_with(code: Vec<Instruction>, locals: usize) -> Unit {
        let method = MethodDef {
            name: "process".to_string(),
            public: true,
            arity: 0,
            chunk: Chunk { locals, code },
        };
        Unit {
            name: "test".to_string(),
            imports: Vec::new(),
            constants: vec![Constant::Null, Constant::Int(1)],
            types: vec![TypeDef {
                name: "Script".to_string(),
                exported: true,
                fields: vec!["deps".to_string()],
                constructor: MethodDef {
                    name: "init".to_string(),
                    public: true,
                    arity: 1,
                    chunk: Chunk {
                        locals: 1,
                        code: vec![
                            Instruction::LoadLocal(0),
                            Instruction::StoreField(0),
                            Instruction::Const(0),
                            Instruction::Return,
                        ],
                    },
                },
                methods: vec![method],
            }],
        }
    }

    #[test]
    fn test_accepts_well_formed_unit() {
        let unit = unit_with(vec![Instruction::Const(1), Instruction::Return], 0);
        assert!(verify(&unit).is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_indices() {
        let cases = vec![
            vec![Instruction::Const(9), Instruction::Return],
            vec![Instruction::LoadLocal(0), Instruction::Return],
            vec![Instruction::LoadField(3), Instruction::Return],
            vec![Instruction::Jump(7)],
            vec![Instruction::CallImport { import: 0, argc: 0 }, Instruction::Return],
            vec![Instruction::CallMethod { method: 0, argc: 2 }, Instruction::Return],
            vec![Instruction::GetMember(1), Instruction::Return],
        ];
        for code in cases {
            let unit = unit_with(code.clone(), 0);
            assert!(
                matches!(verify(&unit), Err(LoadError::InvalidBytecode { .. })),
                "accepted {:?}",
                code
            );
        }
    }

    #[test]
    fn test_rejects_fall_through() {
        let unit = unit_with(vec![Instruction::Const(0)], 0);
        let err = verify(&unit).unwrap_err();
        assert!(err.to_string().contains("Script.process"));
    }
}
