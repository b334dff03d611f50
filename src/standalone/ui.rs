//! Minimal HTML console for the standalone service.

/// Default page title.
pub const DEFAULT_TITLE: &str = "Rune Agent UI";

/// Renders the console page for an API rooted at `api_base_path`.
#[must_use]
pub fn render_console(api_base_path: &str, title: &str) -> String {
    let base = if api_base_path.is_empty() { "/" } else { api_base_path };
    let title = escape_html(title);
    let base_literal = serde_json::to_string(base).unwrap_or_else(|_| "\"/\"".to_string());

    CONSOLE_TEMPLATE
        .replace("{{TITLE}}", &title)
        .replace("{{API_BASE}}", &base_literal)
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

const CONSOLE_TEMPLATE: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>{{TITLE}}</title>
  <style>
    body { font-family: ui-sans-serif, system-ui, sans-serif; max-width: 960px; margin: 2rem auto; padding: 0 1rem; }
    .row { display: flex; gap: 1rem; flex-wrap: wrap; margin-bottom: 1rem; }
    .card { border: 1px solid #ddd; border-radius: 8px; padding: 1rem; flex: 1; min-width: 280px; }
    label { display: block; font-weight: 600; margin-bottom: 0.25rem; }
    select, textarea, input, button { width: 100%; padding: 0.5rem; font: inherit; }
    pre { background: #111; color: #eaeaea; padding: 0.75rem; border-radius: 6px; overflow: auto; }
  </style>
</head>
<body>
  <h1>{{TITLE}}</h1>
  <div class="row">
    <div class="card">
      <label for="action">Action</label>
      <select id="action"></select>
      <label for="input">JSON input (blank for none)</label>
      <textarea id="input" rows="6"></textarea>
      <div class="row">
        <button id="run">Run</button>
        <button id="refresh">Refresh</button>
      </div>
      <div class="row">
        <input id="timeout" type="number" min="0" value="30000" />
        <button id="wait">Wait for change</button>
      </div>
    </div>
    <div class="card">
      <label>Response</label>
      <pre id="response">{}</pre>
    </div>
  </div>
  <div class="card">
    <label>Snapshot</label>
    <pre id="snapshot">{}</pre>
  </div>
  <script type="module">
    const base = {{API_BASE}};
    const rootUrl = base.endsWith("/") ? base : base + "/";
    const actionsUrl = base === "/" ? "/actions/" : base + "/actions/";
    const $ = (id) => document.getElementById(id);
    let snapshot = null;

    const show = (payload) => {
      $("response").textContent = JSON.stringify(payload, null, 2);
      if (payload && payload.snapshot) {
        snapshot = payload.snapshot;
        $("snapshot").textContent = JSON.stringify(snapshot, null, 2);
        $("action").innerHTML = Object.keys(snapshot.actions || {})
          .map((name) => "<option>" + name + "</option>").join("");
      }
    };

    const refresh = async () => show(await (await fetch(rootUrl)).json());

    const run = async (name, input) => {
      const response = await fetch(actionsUrl + encodeURIComponent(name), {
        method: "POST",
        headers: { "content-type": "application/json" },
        body: input === undefined ? "" : JSON.stringify(input)
      });
      show(await response.json());
    };

    $("refresh").onclick = refresh;
    $("run").onclick = async () => {
      try {
        const raw = $("input").value.trim();
        await run($("action").value, raw === "" ? undefined : JSON.parse(raw));
      } catch (error) {
        show({ ok: false, error: String(error) });
      }
    };
    $("wait").onclick = async () => {
      if (!snapshot) await refresh();
      await run("wait", { since: snapshot ? snapshot.revision : 0, timeoutMs: Number($("timeout").value) || 0 });
    };

    await refresh();
  </script>
</body>
</html>
"#;
