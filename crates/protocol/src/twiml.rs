//! TwiML-Antworten fuer eingehende Anruf-Webhooks
//!
//! Der Telefonie-Anbieter ruft beim Verbindungsaufbau einen Webhook auf und
//! erwartet XML-Anweisungen. Wir antworten mit `<Connect><Stream>`, womit
//! das Audio des Anrufs bidirektional an unseren WebSocket geht.

/// Pfad des Media-Stream-WebSockets
pub const STREAM_PFAD: &str = "/ws/call";

/// Pfad des Webhooks, den der Anbieter beim Verbindungsaufbau aufruft
pub const ANRUF_PFAD: &str = "/twilio/call";

/// Erzeugt die TwiML-Antwort, die den Anruf auf `stream_url` verbindet
pub fn stream_verbinden(stream_url: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <Response><Connect><Stream url=\"{}\" /></Connect></Response>",
        xml_escape(stream_url)
    )
}

/// Leitet die WebSocket-URL aus der oeffentlichen Basis-URL ab
///
/// `https://example.org` wird zu `wss://example.org/ws/call`,
/// `http://` entsprechend zu `ws://`. Ohne Schema wird `wss://` angenommen.
pub fn stream_url_aus_basis(basis: &str) -> String {
    let basis = basis.trim_end_matches('/');
    let (schema, host) = if let Some(rest) = basis.strip_prefix("https://") {
        ("wss", rest)
    } else if let Some(rest) = basis.strip_prefix("http://") {
        ("ws", rest)
    } else if let Some(rest) = basis.strip_prefix("wss://") {
        ("wss", rest)
    } else if let Some(rest) = basis.strip_prefix("ws://") {
        ("ws", rest)
    } else {
        ("wss", basis)
    };
    format!("{schema}://{host}{STREAM_PFAD}")
}

fn xml_escape(text: &str) -> String {
    let mut aus = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => aus.push_str("&amp;"),
            '<' => aus.push_str("&lt;"),
            '>' => aus.push_str("&gt;"),
            '"' => aus.push_str("&quot;"),
            '\'' => aus.push_str("&apos;"),
            _ => aus.push(c),
        }
    }
    aus
}
