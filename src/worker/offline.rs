//! Self-contained fallback document served when a page is neither cached
//! nor reachable.

use crate::net::Response;

/// How often the page re-checks connectivity.
pub const RECONNECT_POLL_MS: u64 = 5_000;

/// Delay between coming back online and reloading.
pub const RELOAD_GRACE_MS: u64 = 2_000;

const OFFLINE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Offline - Learning Journal</title>
  <style>
    * { box-sizing: border-box; margin: 0; padding: 0; }
    body {
      font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
      background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
      color: #333;
      min-height: 100vh;
      display: flex;
      align-items: center;
      justify-content: center;
      padding: 20px;
    }
    .card {
      background: #fff;
      border-radius: 16px;
      box-shadow: 0 20px 40px rgba(0, 0, 0, 0.15);
      max-width: 480px;
      padding: 40px 32px;
      text-align: center;
    }
    .icon { font-size: 64px; margin-bottom: 16px; }
    h1 { font-size: 1.75rem; margin-bottom: 12px; color: #4a4a8a; }
    p { line-height: 1.6; margin-bottom: 12px; }
    ul { list-style: none; margin: 16px 0 24px; text-align: left; }
    li { padding: 6px 0; border-bottom: 1px solid #eee; }
    .status { font-weight: 600; color: #c0392b; }
    .status.online { color: #27ae60; }
    button {
      background: #667eea;
      border: none;
      border-radius: 8px;
      color: #fff;
      cursor: pointer;
      font-size: 1rem;
      padding: 12px 28px;
    }
    button:hover { background: #5563d6; }
  </style>
</head>
<body>
  <main class="card">
    <div class="icon">&#128218;</div>
    <h1>You're offline</h1>
    <p>This page isn't available without a connection yet.</p>
    <p>While you wait, you can still:</p>
    <ul>
      <li>Read pages you've already visited</li>
      <li>Write new reflections; they'll sync when you're back online</li>
    </ul>
    <p>Connection status: <span id="status" class="status">Offline</span></p>
    <button type="button" onclick="window.location.reload()">Try again</button>
  </main>
  <script>
    (function () {
      var status = document.getElementById('status');
      var reloading = false;

      function scheduleReload() {
        if (reloading) { return; }
        reloading = true;
        status.textContent = 'Back online, reloading...';
        status.className = 'status online';
        setTimeout(function () { window.location.reload(); }, __RELOAD_GRACE_MS__);
      }

      window.addEventListener('online', scheduleReload);
      setInterval(function () {
        if (navigator.onLine) { scheduleReload(); }
      }, __RECONNECT_POLL_MS__);
    })();
  </script>
</body>
</html>
"#;

/// The offline document as HTML text.
pub fn offline_document() -> String {
  OFFLINE_TEMPLATE
    .replace("__RECONNECT_POLL_MS__", &RECONNECT_POLL_MS.to_string())
    .replace("__RELOAD_GRACE_MS__", &RELOAD_GRACE_MS.to_string())
}

/// Offline document wrapped in a 200 response, so browsers render it like any page.
pub fn offline_page() -> Response {
  Response::html(offline_document()).with_header("cache-control", "no-store")
}
