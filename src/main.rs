//! Blockwork demo entry point
//!
//! Builds a headless brick field: generated bricks, one ball actor bouncing
//! through a toroidal collision space, and a simulated click that removes a
//! brick through the dispatch graph. Runs until every brick is gone, the
//! watchdog asks to quit, or the frame limit is reached.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use blockwork::collision::WrapType;
use blockwork::event::{GenerateAction, VisualEvent};
use blockwork::{
    BlockAction, Canvas, CollisionSpace, Connection, EventType, InputEvent, LevelElement, LevelGenerator,
    LevelTemplate, Manager, MouseButton, Settings,
};

const FRAME_MS: f64 = 1000.0 / 60.0;
const MAX_FRAMES: u64 = 60 * 20;
const WATCHDOG: Duration = Duration::from_secs(30);

const BRICK: &str = r#"{
    "width": 56, "height": 24,
    "generate_count": 40,
    "cell_offset_x": "Centered",
    "cell_offset_y": "Centered",
    "collision": {"Object": {"hitbox": {"x": 0, "y": 0, "w": 56, "h": 24}}}
}"#;

const BALL: &str = r#"{
    "width": 16, "height": 16,
    "collision": {"Actor": {"hitbox": {"x": 0, "y": 0, "w": 16, "h": 16}, "vel": [170.0, -260.0]}}
}"#;

const LEVEL: &str = r#"{
    "cell_width": 64, "cell_height": 32,
    "grid_x_len": 12, "grid_y_len": 6,
    "offset_x": 16, "offset_y": 48
}"#;

fn main() {
    #[cfg(not(target_arch = "wasm32"))]
    env_logger::init();
    log::info!("Blockwork demo starting...");

    let settings = Settings::load("blockwork.json");
    let seed = std::env::args().nth(1).and_then(|s| s.parse().ok()).unwrap_or(0);

    if let Err(e) = run(settings, seed) {
        log::error!("Demo failed: {e}");
        std::process::exit(1);
    }
}

fn run(mut settings: Settings, seed: u64) -> Result<(), Box<dyn std::error::Error>> {
    settings.collision.wrap_x = WrapType::Toroidal;
    settings.collision.wrap_y = WrapType::Toroidal;

    let manager = Manager::new(settings.clone());
    let props = settings.collision;

    let canvas = Canvas::new(props.total_size_x(), props.total_size_y()).shared();
    manager.register_eventable(&canvas);
    manager.set_main_canvas(canvas.clone());

    let space = Rc::new(RefCell::new(CollisionSpace::new(props, canvas.clone())?));
    manager.register_eventable(&space);
    manager.add_frame_processor(&space);

    let generator = LevelGenerator::new(manager.clone(), canvas.clone())
        .with_collision(space.clone())
        .shared();
    let generator_id = manager.register_eventable(&generator);

    let bricks = manager.register_group();
    let balls = manager.register_group();

    let ball = {
        let mut g = generator.borrow_mut();
        let seed = g.seed_random_generator(seed);
        log::info!("Level seed: {seed}");

        let brick = g.add_level_element(LevelElement {
            group: Some(bricks),
            ..LevelElement::from_json(BRICK)?
        });
        let ball = g.add_level_element(LevelElement {
            group: Some(balls),
            ..LevelElement::from_json(BALL)?
        });

        let level = g.add_level_template(LevelTemplate {
            elements: vec![brick],
            ..LevelTemplate::from_json(LEVEL)?
        })?;
        g.generate_level_from_template(level)?;
        g.add_block_at(ball, 400, 500)?
    };

    // Ball hits: drop the brick and bounce vertically
    let score = Rc::new(Cell::new(0u32));
    {
        let generator = generator.clone();
        let space = space.clone();
        let score = score.clone();
        manager.add_event_action_connection(Connection::run_func(
            balls,
            EventType::COLLIDED_WITH,
            move |e| {
                let Some(brick) = e.kind.collided_with_id() else {
                    return;
                };
                let removed = generator
                    .try_borrow_mut()
                    .is_ok_and(|mut g| g.remove_block(brick).is_ok());
                if !removed {
                    return;
                }
                score.set(score.get() + 1);
                if let Ok(mut space) = space.try_borrow_mut() {
                    if let Some(vel) = space.actor(e.origin).map(|a| a.vel) {
                        space.actor_set_velocity(e.origin, vel.x, -vel.y);
                    }
                }
            },
        ))?;
    }

    // Clicking a brick removes it
    manager.add_event_action_connection(Connection::new(
        bricks,
        EventType::Visual(VisualEvent::PressDown),
        generator_id,
        BlockAction::Generate(GenerateAction::RemoveSender { sender: blockwork::Id::NULL }),
    ))?;

    let interrupt = manager.interrupt_handle();
    std::thread::spawn(move || {
        std::thread::sleep(WATCHDOG);
        log::warn!("Watchdog expired, requesting quit");
        interrupt.request_quit();
    });

    let remaining = |generator: &Rc<RefCell<LevelGenerator>>| {
        generator.borrow().active_block_count().saturating_sub(1)
    };
    log::info!("Generated {} bricks", remaining(&generator));

    // Press the top-left cell; removes the brick if one was generated there
    manager.handle_input(InputEvent::MouseDown {
        x: 16 + 32,
        y: 48 + 16,
        button: MouseButton::Left,
    });

    let frame = Duration::from_secs_f64(FRAME_MS / 1000.0);
    while !manager.quit_requested() && manager.frame_count() < MAX_FRAMES {
        let start = Instant::now();
        manager.frame(FRAME_MS);

        if remaining(&generator) == 0 {
            log::info!("All bricks cleared");
            break;
        }
        if manager.frame_count() % 60 == 0 {
            log::debug!(
                "Frame {}: score {}, {} bricks left",
                manager.frame_count(),
                score.get(),
                remaining(&generator)
            );
        }
        if let Some(rest) = frame.checked_sub(start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    log::info!(
        "Finished after {} frames: score {}, {} bricks left, {} events dropped (ball {ball})",
        manager.frame_count(),
        score.get(),
        remaining(&generator),
        manager.dropped_events()
    );
    Ok(())
}
