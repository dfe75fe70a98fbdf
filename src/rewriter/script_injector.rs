//! Script injection after the opening `<head>` tag.
//!
//! Every injected block carries an id derived from its script content and
//! guards itself at runtime: the first copy to run drops a marker element
//! into the document, later copies with the same id see it and return.
//! Attaching the same injector twice, or serving a page that was already
//! rewritten, therefore never runs the script twice.

use super::{Rewrite, Token, TokenRewriter};

const AFTER_DOM_IDLE_TEMPLATE: &str = include_str!("assets/after_dom_idle.js");
const AFTER_DOM_IDLE_SLOT: &str = "'{{AFTER_DOM_IDLE_SCRIPT}}'";

/// When the injected script runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecTime {
    /// Immediately, while the `<head>` is being parsed.
    BeforeDomContentLoaded,
    /// On `DOMContentLoaded`.
    AfterDomContentLoaded,
    /// Once the DOM stops changing for a short while after load.
    AfterDomIdle,
}

/// Appends a self-guarding `<script>` block after `<head>`.
#[derive(Debug, Clone)]
pub struct ScriptInjector {
    id: String,
    exec_time: ExecTime,
    block: String,
}

impl ScriptInjector {
    pub fn new(script: &str, exec_time: ExecTime) -> Self {
        let body = match exec_time {
            ExecTime::BeforeDomContentLoaded => script.to_string(),
            ExecTime::AfterDomContentLoaded => format!(
                "document.addEventListener('DOMContentLoaded', () => {{\n{}\n}});",
                script
            ),
            ExecTime::AfterDomIdle => AFTER_DOM_IDLE_TEMPLATE.replacen(AFTER_DOM_IDLE_SLOT, script, 1),
        };
        let id = format!("{:x}", md5::compute(body.as_bytes()));
        let block = render_block(&id, &body);
        Self {
            id,
            exec_time,
            block,
        }
    }

    /// Substitute `params` into `script` before building the injector.
    ///
    /// Longer keys are replaced first so a key that is a prefix of another
    /// cannot clobber it.
    pub fn with_params(script: &str, exec_time: ExecTime, params: &[(&str, &str)]) -> Self {
        let mut params = params.to_vec();
        params.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        let script = params
            .iter()
            .fold(script.to_string(), |acc, (key, value)| acc.replace(key, value));
        Self::new(&script, exec_time)
    }

    /// Content-derived identifier of the injected block.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn exec_time(&self) -> ExecTime {
        self.exec_time
    }

    /// The full `<script>` element that gets appended.
    pub fn block(&self) -> &str {
        &self.block
    }
}

impl TokenRewriter for ScriptInjector {
    fn should_rewrite(&self, token: &Token) -> bool {
        token.name() == "head"
    }

    fn rewrite(&self, token: Token) -> Rewrite {
        Rewrite::append(token, self.block.clone())
    }
}

fn render_block(id: &str, body: &str) -> String {
    let body = body
        .replace("</script", "<\\/script")
        .replace("</SCRIPT", "<\\/SCRIPT");
    let mut block = String::with_capacity(body.len() + 384);
    block.push_str("\n<script data-ladder-script=\"");
    block.push_str(id);
    block.push_str("\">\n(() => {\n");
    block.push_str("  const marker = 'ladder-script-");
    block.push_str(id);
    block.push_str("';\n");
    block.push_str("  if (document.querySelector('meta[name=\"' + marker + '\"]')) return;\n");
    block.push_str("  const flag = document.createElement('meta');\n");
    block.push_str("  flag.name = marker;\n");
    block.push_str("  (document.head || document.documentElement).appendChild(flag);\n");
    block.push_str(&body);
    block.push_str("\n})();\n</script>\n");
    block
}
