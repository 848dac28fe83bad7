// JavaScript and TypeScript harnesses

use super::entry::{self, Syntax};
use super::{encoded_arguments, literal, render, HarnessStrategy};
use crate::error::Result;
use arena_common::TestCase;
use serde_json::json;

// Entry lookup uses `typeof`, which is safe on undeclared names in plain
// JavaScript, so every candidate can be checked at runtime.
const JAVASCRIPT_TEMPLATE: &str = r##"{{source}}

;(function () {
  const __arenaArgs = JSON.parse({{args}});
  const __arenaEntry =
{{#each candidates}}
    typeof {{this}} === "function" ? {{this}} :
{{/each}}
    null;

  function __arenaEmit(value) {
    const line = JSON.stringify(value === undefined ? null : value);
    if (typeof line !== "string") {
      throw new TypeError("Return value is not JSON serializable");
    }
    process.stdout.write("\n" + line + "\n");
  }

  function __arenaFail(err) {
    console.error(err && err.stack ? err.stack : String(err));
    process.exitCode = 1;
  }

  try {
    if (__arenaEntry === null) {
      throw new Error("{{no_entry}}");
    }
    const result = __arenaEntry(...__arenaArgs);
    if (result !== null && typeof result === "object" && typeof result.then === "function") {
      result.then(function (value) {
        try {
          __arenaEmit(value);
        } catch (err) {
          __arenaFail(err);
        }
      }, __arenaFail);
    } else {
      __arenaEmit(result);
    }
  } catch (err) {
    __arenaFail(err);
  }
})();
"##;

// The type checker rejects references to undeclared names, so only the
// statically discovered entry point is ever mentioned. Node globals are
// reached through `globalThis` because @types/node may not be installed.
const TYPESCRIPT_TEMPLATE: &str = r##"{{source}}

;(function (): void {
  const __arenaHost: any = globalThis as any;
  const __arenaArgs: any[] = JSON.parse({{args}});

  const __arenaEmit = (value: any): void => {
    const line: any = JSON.stringify(value === undefined ? null : value);
    if (typeof line !== "string") {
      throw new TypeError("Return value is not JSON serializable");
    }
    __arenaHost.process.stdout.write("\n" + line + "\n");
  };

  const __arenaFail = (err: any): void => {
    __arenaHost.console.error(err && err.stack ? err.stack : String(err));
    __arenaHost.process.exitCode = 1;
  };

  try {
{{#if entry}}
    const result: any = ({{entry}} as any)(...__arenaArgs);
    if (result !== null && typeof result === "object" && typeof result.then === "function") {
      result.then((value: any) => {
        try {
          __arenaEmit(value);
        } catch (err) {
          __arenaFail(err);
        }
      }, __arenaFail);
    } else {
      __arenaEmit(result);
    }
{{else}}
    throw new Error("{{no_entry}}");
{{/if}}
  } catch (err) {
    __arenaFail(err);
  }
})();
"##;

/// Node.js harness
pub struct JavaScriptHarness;

impl HarnessStrategy for JavaScriptHarness {
    fn language(&self) -> &str {
        "javascript"
    }

    fn wrap(&self, source: &str, case: &TestCase) -> Result<String> {
        let args = encoded_arguments(self.language(), case)?;
        let data = json!({
            "source": source,
            "args": literal::javascript(&args),
            "candidates": entry::runtime_candidates(source, Syntax::Script),
            "no_entry": super::NO_ENTRY_POINT,
        });
        render(self.language(), JAVASCRIPT_TEMPLATE, &data)
    }
}

/// TypeScript harness, compiled by the engine before running
pub struct TypeScriptHarness;

impl HarnessStrategy for TypeScriptHarness {
    fn language(&self) -> &str {
        "typescript"
    }

    fn wrap(&self, source: &str, case: &TestCase) -> Result<String> {
        let args = encoded_arguments(self.language(), case)?;
        let data = json!({
            "source": source,
            "args": literal::javascript(&args),
            "entry": entry::find_entry_point(source, Syntax::Script),
            "no_entry": super::NO_ENTRY_POINT,
        });
        render(self.language(), TYPESCRIPT_TEMPLATE, &data)
    }
}
