//! Satz-Zerleger fuer gestreamte LLM-Antworten
//!
//! Sammelt Text-Deltas und gibt vollstaendige Saetze frei, sobald ein
//! Satzende erkannt wurde. So kann die Synthese den ersten Satz sprechen,
//! waehrend das Modell noch schreibt.

/// Mindestlaenge eines Segments; kuerzere Saetze werden mit dem naechsten verbunden
const MIN_SEGMENT_ZEICHEN: usize = 12;

#[derive(Debug, Default)]
pub struct SatzChunker {
    puffer: String,
}

impl SatzChunker {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Nimmt ein Delta auf und gibt alle abgeschlossenen Segmente zurueck
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.puffer.push_str(delta);
        let mut segmente = Vec::new();

        while let Some(ende) = self.satzende() {
            let satz: String = self.puffer.drain(..ende).collect();
            let satz = satz.trim();
            if !satz.is_empty() {
                segmente.push(satz.to_string());
            }
        }
        segmente
    }

    /// Gibt den unvollstaendigen Rest frei (am Ende der Antwort)
    pub fn rest(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.puffer);
        let rest = rest.trim();
        (!rest.is_empty()).then(|| rest.to_string())
    }

    /// Byte-Position direkt hinter dem ersten Satzende (inkl. Leerzeichen)
    fn satzende(&self) -> Option<usize> {
        let mut zeichen = self.puffer.char_indices().peekable();
        while let Some((pos, c)) = zeichen.next() {
            if !matches!(c, '.' | '!' | '?' | ';' | ':' | '\n') {
                continue;
            }
            // Satzende nur vor Leerraum, sonst z.B. "3.5" oder "z.B."
            match zeichen.peek() {
                Some((naechste_pos, n)) if n.is_whitespace() => {
                    if self.puffer[..pos].trim().chars().count() + 1 >= MIN_SEGMENT_ZEICHEN {
                        return Some(*naechste_pos + n.len_utf8());
                    }
                }
                None if c == '\n' => {
                    if self.puffer[..pos].trim().chars().count() >= MIN_SEGMENT_ZEICHEN {
                        return Some(pos + 1);
                    }
                }
                _ => {}
            }
        }
        None
    }
}
