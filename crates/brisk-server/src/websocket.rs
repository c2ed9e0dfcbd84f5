//! WebSocket-based live reload.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Messages sent to connected browsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadMessage {
    /// Connection established
    Connected,

    /// Full page reload
    Reload,

    /// Re-fetch stylesheets without reloading the page
    Css,
}

/// Hub for broadcasting reload messages to all connected clients.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    sender: broadcast::Sender<ReloadMessage>,
}

impl ReloadHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self { sender }
    }

    /// Send a message to all connected clients.
    pub fn send(&self, msg: ReloadMessage) {
        // No receivers just means no browser is open.
        let _ = self.sender.send(msg);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.sender.subscribe()
    }

    /// Get the number of connected clients.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate the client-side live reload script.
///
/// The script connects back to `socket_path` on the host that served the
/// page, so it works for any bind address.
pub fn livereload_client_script(socket_path: &str) -> String {
    format!(
        r#"
(function() {{
  'use strict';

  var url = (location.protocol === 'https:' ? 'wss://' : 'ws://') + location.host + '{}';
  var reconnectAttempts = 0;
  var maxReconnectAttempts = 10;

  function refreshStylesheets() {{
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    Array.prototype.forEach.call(links, function(link) {{
      var href = link.getAttribute('href');
      if (!href) return;
      var clean = href.replace(/([?&])brisk=\d+&?/, '$1').replace(/[?&]$/, '');
      var sep = clean.indexOf('?') === -1 ? '?' : '&';
      link.setAttribute('href', clean + sep + 'brisk=' + Date.now());
    }});
  }}

  function connect(isReconnect) {{
    var ws = new WebSocket(url);

    ws.onopen = function() {{
      if (isReconnect) {{
        location.reload();
        return;
      }}
      reconnectAttempts = 0;
    }};

    ws.onmessage = function(event) {{
      var msg = JSON.parse(event.data);

      switch (msg.type) {{
        case 'reload':
          location.reload();
          break;

        case 'css':
          refreshStylesheets();
          break;

        case 'connected':
          console.log('[brisk] Live reload connected');
          break;
      }}
    }};

    ws.onclose = function() {{
      if (reconnectAttempts < maxReconnectAttempts) {{
        reconnectAttempts++;
        setTimeout(function() {{ connect(true); }}, 1000 * reconnectAttempts);
      }}
    }};
  }}

  connect(false);
}})();
"#,
        socket_path
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn hub_broadcasts_messages() {
        let hub = ReloadHub::new();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        hub.send(ReloadMessage::Css);

        assert_eq!(first.try_recv().unwrap(), ReloadMessage::Css);
        assert_eq!(second.try_recv().unwrap(), ReloadMessage::Css);
        assert_eq!(hub.subscriber_count(), 2);
    }

    #[test]
    fn sending_without_clients_is_harmless() {
        ReloadHub::new().send(ReloadMessage::Reload);
    }

    #[test]
    fn serializes_messages() {
        assert_eq!(
            serde_json::to_string(&ReloadMessage::Reload).unwrap(),
            r#"{"type":"reload"}"#
        );
        assert_eq!(
            serde_json::to_string(&ReloadMessage::Css).unwrap(),
            r#"{"type":"css"}"#
        );
    }

    #[test]
    fn script_connects_to_socket_path() {
        let script = livereload_client_script("/__brisk/livereload");
        assert!(script.contains("location.host + '/__brisk/livereload'"));
    }
}
