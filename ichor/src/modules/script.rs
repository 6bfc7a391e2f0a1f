use crate::context::GenContext;
use crate::error::GenerationError;
use crate::fragment::{Fragment, Node};
use crate::grammar::Scope;
use crate::module::FuzzModule;

/// Plain grammar output: a short statement list with a fresh scope.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptModule;

impl FuzzModule for ScriptModule {
    fn name(&self) -> &str {
        "script"
    }

    fn default_weight(&self) -> u32 {
        10
    }

    fn make_command(&self, cx: &mut GenContext<'_>) -> Result<Vec<Fragment>, GenerationError> {
        let budget = cx.budget();
        let stmts = cx.stmts(budget, &Scope::new());
        Ok(vec![Fragment::script(Node::Seq(stmts))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::testing::command;

    #[test]
    fn test_script_is_one_fragment() {
        for seed in 0..20 {
            let (fragments, _) = command(&ScriptModule, seed);
            assert_eq!(fragments.len(), 1);
            assert!(matches!(fragments[0].node, Node::Seq(ref s) if !s.is_empty()));
        }
    }
}
