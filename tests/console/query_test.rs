//! Feature queries against a scripted engine.

use brick_console::config::ExchangeConfig;
use brick_console::console::ExchangeError;
use brick_console::queries::{self, ExchangeResultExt, PLAYER_NAMES_COMMAND};

use super::{pattern, scripted};

#[tokio::test(start_paused = true)]
async fn test_player_names_collects_dump() {
    let (console, engine, _lines, _dispatcher) = scripted(|engine| {
        engine.reply(
            PLAYER_NAMES_COMMAND,
            &[
                (2, "0) BP_PlayerState_C /Game/Maps/Plate/Plate.Plate:PersistentLevel.BP_PlayerState_C_2147482431.PlayerName = Zeblote"),
                (3, "LogChat: Zeblote: hello"),
                (4, "1) BP_PlayerState_C /Game/Maps/Plate/Plate.Plate:PersistentLevel.BP_PlayerState_C_2147482102.PlayerName = Aware"),
            ],
        )
    });

    let roster = queries::player_names(&console, &ExchangeConfig::default())
        .await
        .unwrap();

    assert_eq!(roster.names(), vec!["Zeblote", "Aware"]);
    assert_eq!(engine.sent(), vec![PLAYER_NAMES_COMMAND]);
}

#[tokio::test(start_paused = true)]
async fn test_player_names_empty_server() {
    let (console, _engine, _lines, _dispatcher) = scripted(|engine| engine);

    let roster = queries::player_names(&console, &ExchangeConfig::default())
        .await
        .unwrap();
    assert!(roster.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_player_names_propagates_shutdown() {
    let (console, _engine, _lines, dispatcher) = scripted(|engine| engine);
    dispatcher.shutdown();
    dispatcher.join().await.unwrap();

    let err = queries::player_names(&console, &ExchangeConfig::default())
        .await
        .unwrap_err();
    assert_eq!(err, ExchangeError::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn test_found_on_unanswered_single() {
    let (console, _engine, _lines, _dispatcher) = scripted(|engine| engine);

    let found = console
        .run_single(
            "GetAll BP_Pawn_C Health",
            &pattern(r"Health = (?<hp>\d+)"),
            std::time::Duration::from_millis(20),
        )
        .await
        .found()
        .unwrap();
    assert_eq!(found, None);
}
