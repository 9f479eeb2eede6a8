use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_layer::Layer;
use url::Url;

use courier_mesh::{
    layer::EnvelopeValidationLayer,
    llm::{script::ScriptedModel, LlmClient, ModelResponse, ToolCall},
    prelude::*,
    store::{MemoryStore, RecordStore},
    tool::domain::{order_tools, payment_tools, warehouse_tools},
};

const TENANT: &str = "acme";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_mesh=debug".into()),
        )
        .init();

    println!("🚚 Courier-Mesh Exception Resolution Demo\n");

    // Seed the record store with the affected order and warehouse stock
    let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
    store
        .put(
            TENANT,
            "order:ORD-2041",
            json!({"status": "shipped", "sku": "SKU-7", "value": 250.0}),
        )
        .await?;
    store
        .put(TENANT, "inventory:SKU-7", json!({"available": 12}))
        .await?;
    println!("✓ Seeded order ORD-2041 ($250) and 12 units of SKU-7\n");

    // Wire the specialists: each gets its own tool set and model script
    let publisher = EventPublisher::new();
    let directory = AgentDirectory::new();
    let dispatcher = LocalDispatcher::new();

    let specialists: [(&str, &str, Vec<ToolSpec>, Vec<ModelResponse>); 3] = [
        (
            "payment-agent",
            "Handles refunds and payment adjustments",
            payment_tools(&store),
            vec![
                ModelResponse::tool_calls(vec![ToolCall::new(
                    "issue_refund",
                    json!({
                        "deliveryId": "DEL-88",
                        "orderId": "ORD-2041",
                        "amount": 250.0,
                        "expedite": true
                    }),
                )]),
                ModelResponse::text("Expedited refund of $250.00 issued."),
            ],
        ),
        (
            "warehouse-agent",
            "Allocates inventory for replacement shipments",
            warehouse_tools(&store),
            vec![
                ModelResponse::tool_calls(vec![ToolCall::new(
                    "allocate_inventory",
                    json!({"sku": "SKU-7", "quantity": 1}),
                )]),
                ModelResponse::text("One replacement unit of SKU-7 allocated."),
            ],
        ),
        (
            "order-agent",
            "Mutates orders and owns customer updates",
            order_tools(&store),
            vec![
                ModelResponse::tool_calls(vec![
                    ToolCall::new("recreate_order", json!({"orderId": "ORD-2041"})),
                    ToolCall::new(
                        "notify_customer",
                        json!({
                            "deliveryId": "DEL-88",
                            "message": "Your damaged package is being replaced; the refund \
                                        is expedited."
                        }),
                    ),
                ]),
                ModelResponse::text("Replacement order created and customer notified."),
            ],
        ),
    ];

    for (name, description, tools, script) in specialists {
        let mut registry = ToolRegistry::new();
        for spec in tools {
            registry.register(spec);
        }
        let card = AgentCard::new(
            name,
            description,
            Url::parse(&format!("http://localhost:7400/{name}"))?,
        );
        directory.publish(card.clone());
        dispatcher.register(Arc::new(AgentRuntime::new(
            card,
            format!("You are the {name} for a fulfillment network."),
            Arc::new(registry),
            Arc::new(ScriptedModel::new(script)) as Arc<dyn LlmClient>,
            publisher.clone(),
            RuntimeConfig::default(),
        )));
        println!("✓ Registered {name}");
    }

    // The supervisor's own (scripted) reasoning: refund, restock, recreate
    let supervisor_model = ScriptedModel::new(vec![
        ModelResponse::tool_calls(vec![ToolCall::new(
            "invoke_agent",
            json!({
                "agentId": "payment-agent",
                "message": "Issue an expedited $250 refund for DEL-88 / ORD-2041 \
                            (high-value damaged package)."
            }),
        )]),
        ModelResponse::tool_calls(vec![ToolCall::new(
            "invoke_agent",
            json!({
                "agentId": "warehouse-agent",
                "message": "Allocate one replacement unit of SKU-7."
            }),
        )]),
        ModelResponse::tool_calls(vec![ToolCall::new(
            "invoke_agent",
            json!({
                "agentId": "order-agent",
                "message": "Recreate ORD-2041 as a replacement and notify the customer."
            }),
        )]),
        ModelResponse::text(
            "Expedited refund issued, replacement allocated and on its way, customer notified.",
        ),
    ]);

    let supervisor = Supervisor::new(
        Arc::new(supervisor_model),
        EnvelopeValidationLayer::new().layer(DispatchService::new(dispatcher)),
        directory,
        store.clone(),
        SupervisorConfig::default(),
    );

    // Watch the live event stream for this conversation
    let mut events = publisher.subscribe("ctx-demo");

    println!("\n💥 Incoming exception: high-value package damaged in transit\n");
    let exception = ExceptionEvent::new("DEL-88", "ctx-demo", "Package Damaged", "crushed box")
        .with_order_value(250.0);
    let summary = supervisor
        .resolve(exception, &TenantContext::new(TENANT), CancellationToken::new())
        .await;

    println!("📡 Event stream:");
    while let Ok(payload) = events.try_recv() {
        let event: ConversationEvent = serde_json::from_slice(&payload)?;
        println!("  [{}] {:?}", event.agent_id, event.status);
    }

    println!("\n📝 Resolution summary:");
    println!("  Classification: {}", summary.classification);
    println!("  Agents invoked: {:?}", summary.agents_invoked);
    println!("  Actions completed: {:?}", summary.actions_completed);
    println!("  Status: {:?}", summary.status);
    println!("  Customer impact: {}", summary.customer_impact);

    let refund = store.get(TENANT, "refund:DEL-88").await?.expect("refund record");
    println!("\n💸 Refund record: {}", refund.value);

    println!("\n✅ Exception resolved");
    Ok(())
}
