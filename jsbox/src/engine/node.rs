use async_trait::async_trait;
use std::path::Path;
use tokio::fs;
use which::which;

use crate::engine::{EngineBackend, BOOTSTRAP_FILE, GLOBALS_FILE, RESULT_FILE};
use crate::error::Error;
use crate::types::Capabilities;

/// Node-based engine backend.
///
/// The bootstrap evaluates the script in a `vm` context whose global object
/// has a null prototype and holds nothing but the granted primitives and the
/// injected globals. The context is capability hygiene; the process jail is
/// the security boundary.
pub struct NodeBackend {
    /// V8 old-space cap in megabytes
    heap_limit_mb: u64,
}

impl NodeBackend {
    pub fn new(memory_limit: u64) -> Self {
        // V8 takes the cap in whole megabytes; keep a floor the engine
        // itself can start under and a ceiling V8 will accept
        Self {
            heap_limit_mb: (memory_limit / (1024 * 1024)).clamp(32, 4096),
        }
    }

    fn bootstrap_source(&self, capabilities: &Capabilities, has_globals: bool) -> String {
        let mut js = String::new();

        js.push_str("\"use strict\";\n");
        js.push_str("const fs = require(\"fs\");\n");
        js.push_str("const vm = require(\"vm\");\n");
        js.push_str("\n");
        js.push_str(&format!(
            "const source = fs.readFileSync(\"{}\", \"utf8\");\n",
            self.source_file()
        ));
        js.push_str("const globals = Object.create(null);\n");

        if has_globals {
            js.push_str(&format!(
                "const injected = JSON.parse(fs.readFileSync(\"{}\", \"utf8\"));\n",
                GLOBALS_FILE
            ));
            js.push_str("for (const name of Object.keys(injected)) {\n");
            js.push_str("  globals[name] = injected[name];\n");
            js.push_str("}\n");
        }

        if capabilities.print_functions {
            js.push_str("globals.print = function () {\n");
            js.push_str(
                "  process.stdout.write(Array.prototype.map.call(arguments, String).join(\" \") + \"\\n\");\n",
            );
            js.push_str("};\n");
            js.push_str("globals.println = globals.print;\n");
        }

        if capabilities.exit_functions {
            js.push_str("globals.exit = function (code) {\n");
            js.push_str("  process.exit(code === undefined ? 0 : Number(code));\n");
            js.push_str("};\n");
            js.push_str("globals.quit = globals.exit;\n");
        }

        if capabilities.read_functions {
            js.push_str("let inputLines = [];\n");
            js.push_str("try {\n");
            js.push_str("  let raw = fs.readFileSync(0, \"utf8\");\n");
            js.push_str("  if (raw.endsWith(\"\\n\")) raw = raw.slice(0, -1);\n");
            js.push_str("  inputLines = raw === \"\" ? [] : raw.split(\"\\n\");\n");
            js.push_str("} catch (err) {\n");
            js.push_str("  inputLines = [];\n");
            js.push_str("}\n");
            js.push_str("let inputCursor = 0;\n");
            js.push_str("globals.readLine = function () {\n");
            js.push_str(
                "  return inputCursor < inputLines.length ? inputLines[inputCursor++] : null;\n",
            );
            js.push_str("};\n");
        }

        js.push_str("\n");
        js.push_str("const context = vm.createContext(globals);\n");
        js.push_str("let completion;\n");
        js.push_str("try {\n");
        js.push_str("  completion = vm.runInContext(source, context, { filename: \"sandbox.js\" });\n");
        js.push_str("} catch (err) {\n");
        js.push_str("  process.stderr.write(String(err && err.stack ? err.stack : err) + \"\\n\");\n");
        js.push_str("  process.exit(70);\n");
        js.push_str("}\n");
        js.push_str("if (completion !== undefined) {\n");
        js.push_str("  let rendered = null;\n");
        js.push_str("  try {\n");
        js.push_str("    rendered = String(completion);\n");
        js.push_str("  } catch (err) {\n");
        js.push_str("    rendered = null;\n");
        js.push_str("  }\n");
        js.push_str("  if (rendered !== null) {\n");
        js.push_str(&format!(
            "    fs.writeFileSync(\"{}\", rendered);\n",
            RESULT_FILE
        ));
        js.push_str("  }\n");
        js.push_str("}\n");

        js
    }
}

#[async_trait]
impl EngineBackend for NodeBackend {
    fn file_extension(&self) -> &str {
        "js"
    }

    fn run_command(&self) -> &str {
        "node"
    }

    fn run_args(&self) -> Vec<String> {
        vec![
            format!("--max-old-space-size={}", self.heap_limit_mb),
            BOOTSTRAP_FILE.to_string(),
        ]
    }

    async fn check_tools(&self) -> Result<(), Error> {
        which(self.run_command())
            .map(|_| ())
            .map_err(|_| Error::Engine("node binary not found on PATH".to_string()))
    }

    async fn write_bootstrap(
        &self,
        jail_dir: &Path,
        capabilities: &Capabilities,
        has_globals: bool,
    ) -> Result<(), Error> {
        let bootstrap = self.bootstrap_source(capabilities, has_globals);
        fs::write(jail_dir.join(BOOTSTRAP_FILE), bootstrap)
            .await
            .map_err(|e| Error::Sandbox(format!("Failed to write bootstrap: {}", e)))?;
        Ok(())
    }
}
