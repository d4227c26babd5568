use hotelier::config::Config;
use hotelier::game;
use hotelier::models::item::{InteractionType, ItemBase, RoomItem};
use hotelier::models::room::{AccessState, RoomConfig, RoomIcon, RoomType};
use hotelier::models::types::{HabboId, ItemBaseId, ItemId, RoomId};
use hotelier::repo::{MemoryRoomRepo, RoomModelData};
use hotelier::rooms::template::DoorSpec;
use hotelier::rooms::user::RoomUserKind;
use hotelier::{Registry, Repos};
use std::sync::Arc;
use std::sync::atomic::Ordering;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cfg = Arc::new(Config::from_env()?);

    // In-memory repositories seeded with a demo lobby; a real deployment
    // swaps these for SQL-backed implementations of the same traits.
    let room_repo = Arc::new(MemoryRoomRepo::new());
    seed_lobby(&room_repo);

    let repos = Arc::new(Repos {
        room: room_repo,
        inventory: Arc::new(hotelier::repo::MemoryInventory::new()),
    });
    let registry = Arc::new(Registry::new(repos, cfg));

    let lobby = registry.rooms.get_or_load(RoomId(1)).await?;
    lobby.keep_alive.store(true, Ordering::Relaxed);
    lobby.add_user(
        HabboId(-1),
        RoomUserKind::Bot {
            name: "Concierge".into(),
            figure: "sh-3005-64.hr-150-1.hd-180-1".into(),
            motto: "Welcome to the hotel".into(),
        },
    );
    tracing::info!(room = %lobby.id, "lobby up");

    let tick = game::spawn_tick_loop(registry.clone());

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    tick.abort();

    Ok(())
}

fn seed_lobby(repo: &MemoryRoomRepo) {
    repo.insert_model(
        "lobby",
        RoomModelData {
            // Rows past the first carry the exporter's junk prefix character.
            heightmap: "xxxxxxx\r|x00000x\r|x00000x\r|x00000x\r|x00000x\r|xxxxxxx".into(),
            door: DoorSpec { x: 1, y: 1, z: 0.0, direction: 2 },
            static_furniture: Vec::new(),
            club_only: false,
        },
    );
    repo.insert_config(RoomConfig {
        id: RoomId(1),
        name: "Hotel Lobby".into(),
        description: "Where everyone ends up sooner or later.".into(),
        owner_id: HabboId(0),
        owner_name: "Hotel".into(),
        room_type: RoomType::Public,
        access: AccessState::Open,
        password: String::new(),
        capacity: 50,
        category: 3,
        tags: vec!["lobby".into()],
        model: "lobby".into(),
        allow_pets: false,
        allow_walkthrough: true,
        wallpaper: 110,
        floor: 221,
        landscape: "0.0".into(),
        icon: RoomIcon::default(),
        score: 0,
    });
    repo.insert_item(
        RoomId(1),
        RoomItem {
            id: ItemId(1),
            base: Arc::new(ItemBase {
                id: ItemBaseId(100),
                sprite_id: 145,
                name: "lobby sofa".into(),
                width: 2,
                length: 1,
                height: 1.0,
                can_sit: true,
                can_trade: false,
                interaction: InteractionType::Seat,
            }),
            owner_id: HabboId(0),
            x: 3,
            y: 4,
            z: 0.0,
            rotation: 0,
            wall_position: None,
        },
    );
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, prelude::*};

    color_eyre::install().unwrap();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::uptime()),
        )
        .with(tracing_error::ErrorLayer::default())
        .init();
}
