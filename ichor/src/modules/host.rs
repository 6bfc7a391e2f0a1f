use crate::context::GenContext;
use crate::error::GenerationError;
use crate::fragment::{Fragment, Node};
use crate::grammar::HOST_ACTIONS;
use crate::module::FuzzModule;
use crate::random::{RandomExt, RandomSource};

/// Calls to opaque privileged host actions. Whether a call is safe to run
/// is left to the classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostModule;

impl FuzzModule for HostModule {
    fn name(&self) -> &str {
        "host"
    }

    fn make_command(&self, cx: &mut GenContext<'_>) -> Result<Vec<Fragment>, GenerationError> {
        let (name, arity) = *cx.index(HOST_ACTIONS, &("gc", 0));
        let args = (0..arity)
            .map(|_| {
                if cx.one_in(3) {
                    Node::str(*cx.index(&["compact", "shrinking", "incremental"], &"compact"))
                } else {
                    Node::Number(f64::from(cx.uniform(16)))
                }
            })
            .collect();
        Ok(vec![Fragment::host(Node::stmt(Node::call(
            Node::global(name),
            args,
        )))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::FragmentKind;
    use crate::modules::testing::command;

    #[test]
    fn test_host_calls_match_arity() {
        for seed in 0..40 {
            let (fragments, _) = command(&HostModule, seed);
            assert_eq!(fragments.len(), 1);
            assert_eq!(fragments[0].kind, FragmentKind::Host);
            let Node::ExprStmt(call) = &fragments[0].node else {
                panic!("expected a statement");
            };
            let Node::Call { callee, args } = call.as_ref() else {
                panic!("expected a call");
            };
            let Node::Global(name) = callee.as_ref() else {
                panic!("expected a global callee");
            };
            let arity = HOST_ACTIONS.iter().find(|(n, _)| *n == name.as_str()).unwrap().1;
            assert_eq!(args.len(), arity as usize);
        }
    }
}
