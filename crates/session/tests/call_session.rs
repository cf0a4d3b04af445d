//! Integrationstests fuer CallSession
//!
//! Ein simulierter Telefonie-Anbieter spricht ueber Channels mit der
//! Session. Alle Tests laufen mit pausierter Uhr; Wartezeiten kosten keine
//! echte Zeit.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures_util::{sink, stream, Sink, Stream};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use voxcall_audio::codec::pcm_zu_mulaw;
use voxcall_audio::SAMPLES_PRO_FRAME;
use voxcall_core::SchliessGrund;
use voxcall_dialog::testhilfen::{
    capabilities, MockReasoner, MockStt, MockTts, ReasonerVerhalten,
};
use voxcall_dialog::{Capabilities, DialogConfig, Rolle};
use voxcall_observability::VoxcallMetrics;
use voxcall_session::{CallSession, SessionBericht, SessionConfig, SessionRegistry};

type Eingang = Pin<Box<dyn Stream<Item = Result<String, String>> + Send>>;
type Ausgang = Pin<Box<dyn Sink<String, Error = String> + Send>>;

const LAUT: i16 = 6000;
const LEISE: i16 = 0;

// ---------------------------------------------------------------------------
// Simulierter Anbieter
// ---------------------------------------------------------------------------

struct Anruf {
    eingang: Option<mpsc::UnboundedSender<Result<String, String>>>,
    ausgang: mpsc::UnboundedReceiver<String>,
    shutdown: watch::Sender<bool>,
    session: JoinHandle<SessionBericht>,
    registry: SessionRegistry,
    metriken: VoxcallMetrics,
    seq: u64,
}

impl Anruf {
    fn starten(faehigkeiten: Capabilities, config: SessionConfig) -> Self {
        let (eingang_tx, eingang_rx) = mpsc::unbounded_channel::<Result<String, String>>();
        let (ausgang_tx, ausgang_rx) = mpsc::unbounded_channel::<String>();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let eingang: Eingang = Box::pin(stream::unfold(eingang_rx, |mut rx| async move {
            rx.recv().await.map(|n| (n, rx))
        }));
        let ausgang: Ausgang = Box::pin(sink::unfold(
            ausgang_tx,
            |tx: mpsc::UnboundedSender<String>, text: String| async move {
                tx.send(text).map_err(|_| "Anbieter weg".to_string())?;
                Ok::<_, String>(tx)
            },
        ));

        let registry = SessionRegistry::neu();
        let metriken = VoxcallMetrics::neu().unwrap();
        let session = CallSession::neu(config, faehigkeiten, registry.clone(), metriken.clone());
        let session = tokio::spawn(session.verarbeiten(eingang, ausgang, shutdown_rx));

        Self {
            eingang: Some(eingang_tx),
            ausgang: ausgang_rx,
            shutdown: shutdown_tx,
            session,
            registry,
            metriken,
            seq: 0,
        }
    }

    fn senden(&self, text: String) {
        if let Some(tx) = &self.eingang {
            tx.send(Ok(text)).unwrap();
        }
    }

    fn start(&self) {
        self.senden(r#"{"event":"connected","protocol":"Call","version":"1.0.0"}"#.into());
        self.senden(
            r#"{"event":"start","sequenceNumber":"1","streamSid":"MZ1","start":{
                "accountSid":"AC1","streamSid":"MZ1","callSid":"CA1","tracks":["inbound"],
                "mediaFormat":{"encoding":"audio/x-mulaw","sampleRate":8000,"channels":1}}}"#
                .into(),
        );
    }

    fn media_mit_seq(&self, seq: u64, amplitude: i16) {
        let payload = STANDARD.encode(pcm_zu_mulaw(&[amplitude; SAMPLES_PRO_FRAME]));
        self.senden(format!(
            r#"{{"event":"media","sequenceNumber":"{}","streamSid":"MZ1","media":{{"track":"inbound","chunk":"{seq}","timestamp":"{}","payload":"{payload}"}}}}"#,
            seq + 1,
            seq * 20,
        ));
    }

    fn frames(&mut self, amplitude: i16, anzahl: usize) {
        for _ in 0..anzahl {
            self.seq += 1;
            self.media_mit_seq(self.seq, amplitude);
        }
    }

    /// Eine vollstaendige Aeusserung: Sprache plus Stille ueber den Hangover
    fn aeusserung(&mut self) {
        self.frames(LAUT, 10);
        self.frames(LEISE, 30);
    }

    fn stop(&self) {
        self.senden(r#"{"event":"stop","sequenceNumber":"999","streamSid":"MZ1"}"#.into());
    }

    /// Liest Ausgaben bis eine mit `event` kommt; liefert die vergangene Zeit
    async fn bis_ereignis(&mut self, event: &str, limit: Duration) -> Option<Duration> {
        let beginn = Instant::now();
        let muster = format!(r#""event":"{event}""#);
        tokio::time::timeout(limit, async {
            while let Some(text) = self.ausgang.recv().await {
                if text.contains(&muster) {
                    return Some(beginn.elapsed());
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }

    async fn beenden(&mut self) -> SessionBericht {
        tokio::time::timeout(Duration::from_secs(5), &mut self.session)
            .await
            .expect("Session endet nicht")
            .unwrap()
    }
}

fn config() -> SessionConfig {
    SessionConfig {
        dialog: DialogConfig {
            begruessung: None,
            ..DialogConfig::default()
        },
        ..SessionConfig::default()
    }
}

fn mocks(
    transkript: &str,
    frames_pro_text: usize,
    antwort: &[&str],
) -> (Arc<MockStt>, Arc<MockTts>, Arc<MockReasoner>) {
    (
        Arc::new(MockStt::neu(transkript)),
        Arc::new(MockTts::neu(frames_pro_text)),
        Arc::new(MockReasoner::neu(antwort)),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn volle_runde_ueber_den_socket() {
    let (stt, tts, reasoner) = mocks("what time is it", 5, &["It is noon."]);
    let mut anruf = Anruf::starten(capabilities(stt.clone(), tts.clone(), reasoner), config());
    anruf.start();
    anruf.aeusserung();

    assert!(anruf.bis_ereignis("media", Duration::from_secs(5)).await.is_some());
    assert_eq!(tts.texte(), vec!["It is noon.".to_string()]);
    assert_eq!(anruf.registry.anzahl(), 1);

    // Antwort ausspielen lassen
    tokio::time::sleep(Duration::from_secs(1)).await;
    anruf.stop();
    let registry = anruf.registry.clone();
    let bericht = anruf.beenden().await;

    assert_eq!(bericht.grund, SchliessGrund::StreamGestoppt);
    assert_eq!(bericht.stream_sid.as_deref(), Some("MZ1"));
    assert_eq!(stt.aufrufe(), 1);
    assert_eq!(bericht.verlauf.len(), 2);
    assert_eq!(bericht.verlauf[0].rolle, Rolle::Benutzer);
    assert_eq!(bericht.verlauf[0].text, "what time is it");
    assert_eq!(bericht.verlauf[1].rolle, Rolle::Agent);
    assert_eq!(bericht.verlauf[1].text, "It is noon.");
    assert_eq!(bericht.playout.gesendet, 5);
    assert_eq!(bericht.freigaben, 1);
    assert_eq!(registry.anzahl(), 0);
}

#[tokio::test(start_paused = true)]
async fn begruessung_wird_nach_start_gesprochen() {
    let (stt, tts, reasoner) = mocks("hallo", 3, &["Okay."]);
    let mut anruf = Anruf::starten(capabilities(stt, tts.clone(), reasoner), SessionConfig::default());
    anruf.start();

    assert!(anruf.bis_ereignis("media", Duration::from_secs(1)).await.is_some());
    assert_eq!(tts.texte(), vec![DialogConfig::default().begruessung.unwrap()]);

    anruf.stop();
    anruf.beenden().await;
}

#[tokio::test(start_paused = true)]
async fn markierung_folgt_dem_letzten_frame_der_begruessung() {
    let (stt, tts, reasoner) = mocks("hallo", 3, &["Okay."]);
    let mut anruf = Anruf::starten(capabilities(stt, tts, reasoner), SessionConfig::default());
    anruf.start();

    let mut media = 0;
    let markierung = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(text) = anruf.ausgang.recv().await {
            if text.contains(r#""event":"media""#) {
                media += 1;
            } else if text.contains(r#""event":"mark""#) {
                return Some(text);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
    .expect("keine Markierung nach der Begruessung");
    assert_eq!(media, 3);
    assert!(markierung.contains(r#""name":"job:1""#));

    anruf.stop();
    anruf.beenden().await;
}

#[tokio::test(start_paused = true)]
async fn barge_in_leert_ausgabe_innerhalb_100ms() {
    // 200 Frames = 4 Sekunden Antwort
    let (stt, tts, reasoner) = mocks("tell me a story", 200, &["Once upon a time."]);
    let mut anruf = Anruf::starten(capabilities(stt, tts, reasoner), config());
    anruf.start();
    anruf.aeusserung();

    assert!(anruf.bis_ereignis("media", Duration::from_secs(5)).await.is_some());
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Anrufer faellt dem Agenten ins Wort
    anruf.frames(LAUT, 3);
    let dauer = anruf
        .bis_ereignis("clear", Duration::from_secs(1))
        .await
        .expect("kein clear nach Barge-In");
    assert!(dauer <= Duration::from_millis(100), "clear nach {dauer:?}");

    anruf.stop();
    let metriken = anruf.metriken.clone();
    let bericht = anruf.beenden().await;
    assert_eq!(bericht.dialog.barge_ins, 1);
    assert!(bericht.playout.geleert > 0);
    assert_eq!(metriken.barge_ins_total.get(), 1);

    // Der Satz wurde nie zu Ende gesprochen und fehlt im Verlauf
    assert!(bericht.verlauf.iter().all(|t| t.rolle == Rolle::Benutzer));
}

#[tokio::test(start_paused = true)]
async fn denkzeit_ueberschritten_entschuldigung() {
    let stt = Arc::new(MockStt::neu("are you there"));
    let tts = Arc::new(MockTts::neu(2));
    let reasoner = Arc::new(MockReasoner::mit_verhalten(vec![ReasonerVerhalten::Haengen]));
    let mut anruf = Anruf::starten(capabilities(stt, tts.clone(), reasoner), config());
    anruf.start();
    anruf.aeusserung();

    tokio::time::sleep(Duration::from_secs(14)).await;
    assert!(tts.texte().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(tts.texte(), vec![DialogConfig::default().entschuldigung]);

    anruf.stop();
    let bericht = anruf.beenden().await;
    assert_eq!(bericht.dialog.faehigkeits_fehler, 1);
}

#[tokio::test(start_paused = true)]
async fn leerlauf_beendet_session_genau_einmal() {
    let (stt, tts, reasoner) = mocks("", 1, &["Okay."]);
    let anruf = Anruf::starten(capabilities(stt, tts, reasoner), config());
    anruf.start();

    let beginn = Instant::now();
    let registry = anruf.registry.clone();
    let metriken = anruf.metriken.clone();
    let session = anruf.session;
    let bericht = tokio::time::timeout(Duration::from_secs(130), session)
        .await
        .expect("kein Leerlauf-Abbau")
        .unwrap();

    assert_eq!(bericht.grund, SchliessGrund::Leerlauf);
    assert!(beginn.elapsed() >= Duration::from_secs(120));
    assert_eq!(bericht.freigaben, 1);
    assert_eq!(registry.anzahl(), 0);
    assert_eq!(metriken.active_calls.get(), 0);
    assert_eq!(
        metriken.calls_closed_total.with_label_values(&["leerlauf"]).get(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn vertauschte_frames_kommen_geordnet_an() {
    let (stt, tts, reasoner) = mocks("x", 1, &["Okay."]);
    let mut anruf = Anruf::starten(capabilities(stt, tts, reasoner), config());
    anruf.start();
    for seq in [1, 2, 4, 3, 5, 6, 8, 7, 9, 10] {
        anruf.media_mit_seq(seq, LEISE);
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    anruf.stop();

    let bericht = anruf.beenden().await;
    assert_eq!(bericht.jitter.empfangen, 10);
    assert_eq!(bericht.jitter.freigegeben, 10);
    assert_eq!(bericht.jitter.out_of_order, 2);
    assert_eq!(bericht.jitter.verloren, 0);
}

#[tokio::test(start_paused = true)]
async fn kaputte_payload_wird_verworfen() {
    let (stt, tts, reasoner) = mocks("x", 1, &["Okay."]);
    let mut anruf = Anruf::starten(capabilities(stt, tts, reasoner), config());
    anruf.start();
    anruf.frames(LEISE, 2);
    // 10 statt 160 Bytes
    anruf.senden(format!(
        r#"{{"event":"media","media":{{"chunk":"3","payload":"{}"}}}}"#,
        STANDARD.encode([0xFFu8; 10])
    ));
    anruf.senden("kein json".into());
    anruf.seq = 3;
    anruf.frames(LEISE, 2);
    anruf.stop();

    let metriken = anruf.metriken.clone();
    let bericht = anruf.beenden().await;
    assert_eq!(bericht.grund, SchliessGrund::StreamGestoppt);
    assert_eq!(bericht.codec_fehler, 1);
    assert_eq!(bericht.jitter.empfangen, 4);
    assert_eq!(metriken.codec_errors_total.get(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_beendet_session() {
    let (stt, tts, reasoner) = mocks("x", 1, &["Okay."]);
    let mut anruf = Anruf::starten(capabilities(stt, tts, reasoner), config());
    anruf.start();
    tokio::time::sleep(Duration::from_millis(50)).await;
    anruf.shutdown.send(true).unwrap();

    let bericht = anruf.beenden().await;
    assert_eq!(bericht.grund, SchliessGrund::Shutdown);
    assert_eq!(bericht.freigaben, 1);
}

#[tokio::test(start_paused = true)]
async fn geschlossener_socket_beendet_session() {
    let (stt, tts, reasoner) = mocks("x", 1, &["Okay."]);
    let mut anruf = Anruf::starten(capabilities(stt, tts, reasoner), config());
    anruf.start();
    anruf.frames(LEISE, 3);
    anruf.eingang = None;

    let bericht = anruf.beenden().await;
    assert_eq!(bericht.grund, SchliessGrund::StreamGeschlossen);
    assert_eq!(bericht.freigaben, 1);
}

#[tokio::test(start_paused = true)]
async fn lesefehler_trennt_session() {
    let (stt, tts, reasoner) = mocks("x", 1, &["Okay."]);
    let mut anruf = Anruf::starten(capabilities(stt, tts, reasoner), config());
    anruf.start();
    if let Some(tx) = &anruf.eingang {
        tx.send(Err("connection reset".into())).unwrap();
    }

    let bericht = anruf.beenden().await;
    assert_eq!(bericht.grund, SchliessGrund::SocketGetrennt);
}

#[tokio::test(start_paused = true)]
async fn falsches_audioformat_ist_fatal() {
    let (stt, tts, reasoner) = mocks("x", 1, &["Okay."]);
    let mut anruf = Anruf::starten(capabilities(stt, tts, reasoner), config());
    anruf.senden(
        r#"{"event":"start","streamSid":"MZ1","start":{
            "mediaFormat":{"encoding":"audio/x-l16","sampleRate":16000}}}"#
            .into(),
    );

    let registry = anruf.registry.clone();
    let bericht = anruf.beenden().await;
    assert!(matches!(bericht.grund, SchliessGrund::Fatal(_)));
    assert!(bericht.stream_sid.is_none());
    assert_eq!(registry.anzahl(), 0);
}

#[tokio::test(start_paused = true)]
async fn fehlendes_start_laeuft_ab() {
    let (stt, tts, reasoner) = mocks("x", 1, &["Okay."]);
    let anruf = Anruf::starten(capabilities(stt, tts, reasoner), config());
    anruf.senden(r#"{"event":"connected"}"#.into());

    let bericht = tokio::time::timeout(Duration::from_secs(11), anruf.session)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(bericht.grund, SchliessGrund::Fatal(_)));
}

#[tokio::test(start_paused = true)]
async fn registry_zeigt_aktive_session() {
    let (stt, tts, reasoner) = mocks("x", 1, &["Okay."]);
    let mut anruf = Anruf::starten(capabilities(stt, tts, reasoner), config());
    anruf.start();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let alle = anruf.registry.alle();
    assert_eq!(alle.len(), 1);
    assert_eq!(alle[0].stream_sid.as_deref(), Some("MZ1"));
    assert_eq!(alle[0].call_sid.as_deref(), Some("CA1"));
    assert_eq!(alle[0].dialog.as_deref(), Some("listening"));

    anruf.stop();
    anruf.beenden().await;
}

#[tokio::test(start_paused = true)]
async fn ausgang_wird_beim_abbau_geschlossen() {
    let (stt, tts, reasoner) = mocks("x", 1, &["Okay."]);
    let mut anruf = Anruf::starten(capabilities(stt, tts, reasoner), config());
    anruf.start();
    anruf.stop();
    anruf.beenden().await;

    // Ohne Begruessung wurde nichts gesendet; der Sende-Task hat den Socket geschlossen
    assert!(anruf.ausgang.recv().await.is_none());
}
