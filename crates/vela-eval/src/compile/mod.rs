//! The compile pipeline: normalize, then typecheck.

pub mod normalize;
pub mod typecheck;

use vela_common::EngineError;
use vela_ir::Expr;

use crate::catalog::Catalog;

pub use normalize::normalize;
pub use typecheck::typecheck;

/// Normalize and typecheck in one step. The returned tree is canonical
/// and fully type-tagged — the only form the planner accepts.
pub fn compile(expr: &Expr, catalog: &Catalog) -> Result<Expr, EngineError> {
    let normalized = normalize(expr, catalog)?;
    typecheck(&normalized, catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_ir::{BinaryOp, TypeTag};

    #[test]
    fn compile_produces_typed_canonical_ir() {
        let e = Expr::binary(
            BinaryOp::Gt,
            Expr::call("RSI", vec![], vec![]),
            Expr::int(70),
        );
        let compiled = compile(&e, Catalog::standard()).unwrap();
        assert!(matches!(compiled.ty, Some(TypeTag::Series(_))));
        // alias resolved, default period filled, close input filled
        assert_eq!(compiled.to_string(), "(rsi(ohlcv.close, period=14) > 70)");
    }
}
