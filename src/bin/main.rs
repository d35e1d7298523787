use operating_memory::llm::providers::{GeminiProvider, GroqProvider, MistralProvider};
use operating_memory::llm::LlmClient;
use operating_memory::memory::{SharedWorkspaceState, TieredStateStore};
use operating_memory::storage::InMemoryStore;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    dotenv::dotenv().ok();

    info!("Operating memory demo starting");

    // Register whichever providers have keys in the environment
    let mut llm_client = LlmClient::new();
    if let Some(gemini) = GeminiProvider::from_env() {
        llm_client.register_provider("gemini", Arc::new(gemini));
    }
    if let Some(groq) = GroqProvider::from_env() {
        llm_client.register_provider("groq", Arc::new(groq));
    }
    if let Some(mistral) = MistralProvider::from_env() {
        llm_client.register_provider("mistral", Arc::new(mistral));
    }
    info!(
        "Registered providers: {:?}",
        llm_client.registered_providers()
    );

    let memory = TieredStateStore::new(InMemoryStore::new());

    // --- Personal workflow ---
    let agent_id = "port_agent_007";
    info!(agent_id, "Simulating personal workflow");

    // First read creates the state on the fly
    let mut personal_state = memory.get_personal_state(agent_id).await?;
    personal_state
        .scratchpad
        .insert("congestion_level".to_string(), serde_json::json!(0.85));
    personal_state.scratchpad.insert(
        "berth_availability".to_string(),
        serde_json::json!({"B7": "free", "B8": "occupied"}),
    );
    personal_state.promotion_candidates.insert(
        "delay_hypothesis".to_string(),
        serde_json::json!({"vessel_id": "V-123", "confidence": 0.7}),
    );
    memory.update_personal_state(&mut personal_state).await?;

    let retrieved = memory.get_personal_state(agent_id).await?;
    println!("\n=== PERSONAL STATE ===");
    println!("{}", serde_json::to_string_pretty(&retrieved)?);

    // --- Collaborative workflow ---
    info!("Simulating collaborative workflow");

    let mut event = SharedWorkspaceState::new();
    event.shared_data.insert(
        "initial_alert".to_string(),
        serde_json::json!("Potential 6-hour delay for Vessel V-123"),
    );
    event.participating_agents.push(agent_id.to_string());

    // Subscribe before writing so the notification is observable
    let mut notifications = memory
        .backend()
        .subscribe(&format!("channel:shared_state:{}", event.event_id))
        .await;

    memory.update_shared_state(&mut event).await?;
    info!(event_id = %event.event_id, "Shared event created and update published");

    // Another agent contributes
    let mut shared = memory.get_shared_state(&event.event_id).await?;
    shared
        .shared_data
        .insert("customs_hold".to_string(), serde_json::json!(true));
    shared.shared_data.insert(
        "reason".to_string(),
        serde_json::json!("Secondary inspection required"),
    );
    shared
        .participating_agents
        .push("customs_agent_001".to_string());
    memory.update_shared_state(&mut shared).await?;

    let final_state = memory.get_shared_state(&event.event_id).await?;
    println!("\n=== SHARED STATE ===");
    println!("{}", serde_json::to_string_pretty(&final_state)?);

    println!("\n=== NOTIFICATIONS ===");
    while let Ok(payload) = notifications.try_recv() {
        println!("{}", payload);
    }

    Ok(())
}
