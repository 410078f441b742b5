use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shroud::ToolCall;
use shroud::builder::ShroudBuilder;
use shroud::chat::{ChatMessage, ChatProvider, ChatRole, MessageType};
use shroud::detect::{Detector, Entity};
use shroud::replace::PlaceholderReplacer;
use shroud::store::{
    ConversationStore, EntityStore, InMemoryConversationStore, InMemoryEntityStore,
};
use shroud::testing::{CannedResponse, ScriptedChat, StaticDetector};
use shroud::thread::ThreadId;
use shroud::wrapper::PrivacyChatModel;

const ALICE: &str = "Alice Müller";
const IBAN_1: &str = "DE89370400440532013000";
const IBAN_2: &str = "DE44500105175407324931";

struct Fixture {
    model: Arc<ScriptedChat>,
    entity_store: Arc<InMemoryEntityStore>,
    conversations: Arc<InMemoryConversationStore>,
    wrapper: PrivacyChatModel,
}

fn fixture(detector: Arc<dyn Detector>, replies: Vec<CannedResponse>) -> Fixture {
    let model = Arc::new(ScriptedChat::new(replies));
    let entity_store = Arc::new(InMemoryEntityStore::new());
    let conversations = Arc::new(InMemoryConversationStore::new());
    let wrapper = ShroudBuilder::new()
        .model(model.clone())
        .detector(detector)
        .replacer(Arc::new(PlaceholderReplacer::new(entity_store.clone())))
        .conversation_store(conversations.clone())
        .build()
        .expect("wiring is complete");
    Fixture {
        model,
        entity_store,
        conversations,
        wrapper,
    }
}

fn pii_detector() -> Arc<StaticDetector> {
    Arc::new(StaticDetector::new(vec![
        ("person", ALICE),
        ("iban", IBAN_1),
        ("iban", IBAN_2),
        ("email", "alice@x.com"),
    ]))
}

fn text_reply(content: &str) -> CannedResponse {
    CannedResponse {
        content: content.to_string(),
        calls: None,
    }
}

#[tokio::test]
async fn first_turn_redacts_before_the_model_sees_anything() {
    let f = fixture(
        pii_detector(),
        vec![text_reply("Nice to meet you, [PERSON_01]!")],
    );
    let history = vec![
        ChatMessage::user()
            .content(format!("Hi, I'm {ALICE} and my IBAN is {IBAN_1}."))
            .build(),
    ];

    let reply = f.wrapper.process_turn(&history, Some("T1")).await.unwrap();

    let seen = f.model.histories();
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0][0].content,
        "Hi, I'm [PERSON_01] and my IBAN is [IBAN_01]."
    );

    // the reply reaching the caller is restored
    assert_eq!(reply.content, format!("Nice to meet you, {ALICE}!"));

    // both mappings are recorded
    let thread = ThreadId::from_key("T1");
    assert_eq!(
        f.entity_store
            .get_placeholder(thread, ALICE)
            .await
            .unwrap()
            .as_deref(),
        Some("[PERSON_01]")
    );
    assert_eq!(
        f.entity_store
            .get_placeholder(thread, IBAN_1)
            .await
            .unwrap()
            .as_deref(),
        Some("[IBAN_01]")
    );

    // and the store holds the redacted pair
    let stored = f.conversations.read(thread, None).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].role, ChatRole::Assistant);
    assert!(stored[1].content.contains("[PERSON_01]"));
}

#[tokio::test]
async fn second_turn_reuses_placeholders_and_numbers_new_ones() {
    let f = fixture(
        pii_detector(),
        vec![text_reply("noted"), text_reply("both recorded")],
    );
    let turn1 = vec![
        ChatMessage::user()
            .content(format!("Hi, I'm {ALICE} and my IBAN is {IBAN_1}."))
            .build(),
    ];
    let reply1 = f.wrapper.process_turn(&turn1, Some("T1")).await.unwrap();

    let mut turn2 = turn1.clone();
    turn2.push(reply1);
    turn2.push(
        ChatMessage::user()
            .content(format!("{ALICE} also has IBAN {IBAN_1} and {IBAN_2}."))
            .build(),
    );
    f.wrapper.process_turn(&turn2, Some("T1")).await.unwrap();

    let seen = f.model.histories();
    let last = seen[1].last().unwrap();
    assert_eq!(
        last.content,
        "[PERSON_01] also has IBAN [IBAN_01] and [IBAN_02]."
    );
}

#[tokio::test]
async fn tool_call_arguments_are_redacted_and_restored() {
    let scripted_call = ToolCall::new(
        "tc2",
        "send_email",
        r#"{"to":"[EMAIL_01]","body":"hi"}"#,
    );
    let f = fixture(
        pii_detector(),
        vec![CannedResponse {
            content: String::new(),
            calls: Some(vec![scripted_call]),
        }],
    );

    let history = vec![
        ChatMessage::user().content("write to alice@x.com").build(),
        ChatMessage::assistant()
            .tool_use(vec![ToolCall::new(
                "tc1",
                "send_email",
                r#"{"to":"alice@x.com","body":"hi"}"#,
            )])
            .build(),
    ];
    let reply = f.wrapper.process_turn(&history, Some("T1")).await.unwrap();

    // the model saw placeholder arguments only
    let seen = f.model.histories();
    let assistant = &seen[0][1];
    match &assistant.message_type {
        MessageType::ToolUse(calls) => {
            let args: serde_json::Value =
                serde_json::from_str(&calls[0].function.arguments).unwrap();
            assert_eq!(args["to"], "[EMAIL_01]");
            assert_eq!(args["body"], "hi");
        }
        other => panic!("expected tool use, got {other:?}"),
    }

    // the caller gets the real address back
    match &reply.message_type {
        MessageType::ToolUse(calls) => {
            let args: serde_json::Value =
                serde_json::from_str(&calls[0].function.arguments).unwrap();
            assert_eq!(args["to"], "alice@x.com");
        }
        other => panic!("expected tool use, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_tool_call_id_fails_the_turn() {
    let f = fixture(pii_detector(), vec![text_reply("unreachable")]);
    let call = ToolCall::new("", "send_email", r#"{"to":"alice@x.com"}"#);
    let history = vec![ChatMessage::assistant().tool_use(vec![call]).build()];

    let err = f
        .wrapper
        .process_turn(&history, Some("T1"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "missing_tool_call_id");
    // nothing was stored for the failed turn
    assert!(
        !f.conversations
            .exists(ThreadId::from_key("T1"))
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn restoration_handles_prefix_shaped_placeholders() {
    let f = fixture(
        Arc::new(StaticDetector::new(vec![])),
        vec![text_reply("[PERSON_10] and [PERSON_1] met.")],
    );
    let thread = ThreadId::from_key("T1");
    f.entity_store
        .put(thread, "Ann", "person", "[PERSON_1]")
        .await
        .unwrap();
    f.entity_store
        .put(thread, "Bo", "person", "[PERSON_10]")
        .await
        .unwrap();

    let history = vec![ChatMessage::user().content("who met?").build()];
    let reply = f.wrapper.process_turn(&history, Some("T1")).await.unwrap();
    assert_eq!(reply.content, "Bo and Ann met.");
}

/// Records every payload handed to the inner detector, so tests can assert
/// what was (not) re-detected.
struct RecordingDetector {
    inner: Arc<StaticDetector>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingDetector {
    fn new(inner: Arc<StaticDetector>) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Detector for RecordingDetector {
    fn supported_entities(&self) -> &[String] {
        self.inner.supported_entities()
    }

    async fn detect(
        &self,
        texts: &[String],
        threshold: Option<f32>,
    ) -> Result<Vec<Vec<Entity>>, shroud::ShroudError> {
        self.calls.lock().unwrap().push(texts.to_vec());
        self.inner.detect(texts, threshold).await
    }
}

#[tokio::test]
async fn resumed_threads_only_detect_the_new_tail() {
    let recorder = Arc::new(RecordingDetector::new(pii_detector()));
    let f = fixture(recorder.clone(), vec![text_reply("ok"), text_reply("ok")]);

    let turn1 = vec![
        ChatMessage::user()
            .content(format!("I'm {ALICE}."))
            .build(),
    ];
    let reply1 = f.wrapper.process_turn(&turn1, Some("T1")).await.unwrap();

    let mut turn2 = turn1.clone();
    turn2.push(reply1);
    turn2.push(ChatMessage::user().content("just checking in").build());
    f.wrapper.process_turn(&turn2, Some("T1")).await.unwrap();

    let calls = recorder.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1], vec!["just checking in".to_string()]);
}

#[tokio::test]
async fn replaying_the_same_history_appends_nothing() {
    let f = fixture(pii_detector(), vec![text_reply("ok"), text_reply("ok")]);
    let history = vec![
        ChatMessage::user()
            .content(format!("I'm {ALICE}."))
            .build(),
    ];
    f.wrapper.process_turn(&history, Some("T1")).await.unwrap();

    let thread = ThreadId::from_key("T1");
    let after_first = f.conversations.read(thread, None).await.unwrap().len();

    // same complete history again: the new tail is empty, so the turn is a
    // pure re-ask plus restoration with no storage writes
    f.wrapper.process_turn(&history, Some("T1")).await.unwrap();
    let after_second = f.conversations.read(thread, None).await.unwrap().len();
    assert_eq!(after_first, 2);
    assert_eq!(after_second, 2);
}

#[tokio::test]
async fn system_messages_bypass_detection() {
    let f = fixture(pii_detector(), vec![text_reply("ok")]);
    let system_text = format!("You are helping {ALICE} with her accounts.");
    let history = vec![
        ChatMessage::system().content(&system_text).build(),
        ChatMessage::user()
            .content(format!("My IBAN is {IBAN_1}."))
            .build(),
    ];
    f.wrapper.process_turn(&history, Some("T1")).await.unwrap();

    let seen = f.model.histories();
    assert_eq!(seen[0][0].content, system_text);
    assert_eq!(seen[0][1].content, "My IBAN is [IBAN_01].");
}

#[tokio::test]
async fn concurrent_threads_stay_independent() {
    let f = fixture(pii_detector(), vec![text_reply("ok"), text_reply("ok")]);

    let h1 = vec![
        ChatMessage::user()
            .content(format!("I'm {ALICE}."))
            .build(),
    ];
    let h2 = vec![
        ChatMessage::user()
            .content(format!("IBAN {IBAN_1} belongs to {ALICE}."))
            .build(),
    ];

    let (r1, r2) = tokio::join!(
        f.wrapper.process_turn(&h1, Some("alpha")),
        f.wrapper.process_turn(&h2, Some("beta")),
    );
    r1.unwrap();
    r2.unwrap();

    let alpha = ThreadId::from_key("alpha");
    let beta = ThreadId::from_key("beta");
    // each thread numbers from 01 independently, sharing one store
    assert_eq!(
        f.entity_store
            .get_placeholder(alpha, ALICE)
            .await
            .unwrap()
            .as_deref(),
        Some("[PERSON_01]")
    );
    assert_eq!(
        f.entity_store
            .get_placeholder(beta, ALICE)
            .await
            .unwrap()
            .as_deref(),
        Some("[PERSON_01]")
    );
    // and neither thread sees the other's mappings
    assert!(
        f.entity_store
            .get_placeholder(alpha, IBAN_1)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn keyless_calls_run_protected_but_ephemeral() {
    let f = fixture(pii_detector(), vec![text_reply("ok")]);
    let history = vec![
        ChatMessage::user()
            .content(format!("I'm {ALICE}."))
            .build(),
    ];
    let response = f.wrapper.chat(&history).await.unwrap();
    assert_eq!(response.text().as_deref(), Some("ok"));

    // the model still saw a placeholder
    let seen = f.model.histories();
    assert_eq!(seen[0][0].content, "I'm [PERSON_01].");

    // but nothing was persisted anywhere we could resume from
    let stats = f.conversations.read(ThreadId::from_key(""), None).await;
    assert!(stats.unwrap().is_empty());
}

#[tokio::test]
async fn clearing_a_thread_drops_conversation_and_mappings() {
    let f = fixture(pii_detector(), vec![text_reply("ok")]);
    let history = vec![
        ChatMessage::user()
            .content(format!("I'm {ALICE}."))
            .build(),
    ];
    f.wrapper.process_turn(&history, Some("T1")).await.unwrap();
    f.wrapper.clear_thread("T1").await.unwrap();

    let thread = ThreadId::from_key("T1");
    assert!(f.conversations.read(thread, None).await.unwrap().is_empty());
    assert!(
        f.entity_store
            .list_placeholders(thread)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn stored_history_is_the_redacted_view() {
    let f = fixture(pii_detector(), vec![text_reply("ok")]);
    let history = vec![
        ChatMessage::user()
            .content(format!("I'm {ALICE}."))
            .build(),
    ];
    f.wrapper.process_turn(&history, Some("T1")).await.unwrap();

    let stored = f.wrapper.stored_history("T1", None).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].content, "I'm [PERSON_01].");
}
