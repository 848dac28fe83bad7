// Python harness

use super::entry::{self, Syntax};
use super::{encoded_arguments, literal, render, HarnessStrategy};
use crate::error::Result;
use arena_common::TestCase;
use serde_json::json;

// Everything the harness defines is prefixed so it cannot shadow or be
// shadowed by names in the submission.
const PYTHON_TEMPLATE: &str = r##"{{source}}


def _arena_harness_main():
    import json as _arena_json
    import sys as _arena_sys
    import traceback as _arena_traceback

    try:
        _arena_args = _arena_json.loads({{args}})
        _arena_entry = None
        for _arena_name in ({{#each candidates}}{{this}}, {{/each}}):
            _arena_candidate = globals().get(_arena_name)
            if callable(_arena_candidate):
                _arena_entry = _arena_candidate
                break
        if _arena_entry is None:
            raise NameError({{no_entry}})
        _arena_result = _arena_entry(*_arena_args)
        _arena_line = _arena_json.dumps(_arena_result, allow_nan=False)
    except BaseException:
        _arena_traceback.print_exc()
        _arena_sys.stdout.flush()
        _arena_sys.exit(1)

    _arena_sys.stdout.write("\n" + _arena_line + "\n")
    _arena_sys.stdout.flush()


_arena_harness_main()
"##;

/// CPython 3 harness
pub struct PythonHarness;

impl HarnessStrategy for PythonHarness {
    fn language(&self) -> &str {
        "python"
    }

    fn wrap(&self, source: &str, case: &TestCase) -> Result<String> {
        let args = encoded_arguments(self.language(), case)?;
        let candidates: Vec<String> = entry::runtime_candidates(source, Syntax::Python)
            .iter()
            .map(|name| literal::python(name))
            .collect();
        let data = json!({
            "source": source,
            "args": literal::python(&args),
            "candidates": candidates,
            "no_entry": literal::python(super::NO_ENTRY_POINT),
        });
        render(self.language(), PYTHON_TEMPLATE, &data)
    }
}
