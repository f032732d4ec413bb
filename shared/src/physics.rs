//! Deterministic paddle and ball simulation.
//!
//! The server runs this authoritatively for every match; clients may run the same
//! code to predict motion between snapshots. All randomness is confined to the
//! serve after a goal and is drawn from a caller supplied RNG, so a seeded RNG
//! reproduces a match exactly.

use rand::Rng;
use serde::{Deserialize, Serialize};

pub const COURT_WIDTH: f32 = 800.0;
pub const COURT_HEIGHT: f32 = 400.0;
pub const PADDLE_WIDTH: f32 = 10.0;
pub const PADDLE_HEIGHT: f32 = 80.0;
pub const LEFT_PADDLE_X: f32 = 20.0;
pub const RIGHT_PADDLE_X: f32 = COURT_WIDTH - PADDLE_WIDTH - 20.0;
pub const BALL_RADIUS: f32 = 8.0;

/// Paddle travel in pixels per second.
pub const PADDLE_SPEED: f32 = 300.0;
/// Serve speed in pixels per second.
pub const BALL_SPEED: f32 = 240.0;
/// Vertical velocity added per unit of paddle direction on contact.
pub const SPIN: f32 = 72.0;
/// Speed multiplier applied on every paddle contact.
pub const SPEED_UP: f32 = 1.05;
pub const MAX_BALL_SPEED: f32 = 720.0;

pub const SCORE_LIMIT: u32 = 5;

/// Largest time step a single call to [`step`] will simulate.
pub const MAX_DELTA_TIME: f32 = 1.0 / 20.0;

/// One of the two fixed seats of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Slot {
    Left,
    Right,
}

impl Slot {
    pub const BOTH: [Slot; 2] = [Slot::Left, Slot::Right];

    pub fn index(self) -> usize {
        match self {
            Slot::Left => 0,
            Slot::Right => 1,
        }
    }

    pub fn opponent(self) -> Slot {
        match self {
            Slot::Left => Slot::Right,
            Slot::Right => Slot::Left,
        }
    }

    pub fn from_index(index: usize) -> Option<Slot> {
        match index {
            0 => Some(Slot::Left),
            1 => Some(Slot::Right),
            _ => None,
        }
    }
}

impl From<Slot> for u8 {
    fn from(slot: Slot) -> Self {
        slot.index() as u8
    }
}

impl TryFrom<u8> for Slot {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Slot::from_index(value as usize).ok_or_else(|| format!("invalid slot {}", value))
    }
}

/// Vertical paddle intent. Only the latest value matters; nothing is queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "i8", from = "f64")]
pub enum Direction {
    Up,
    #[default]
    Idle,
    Down,
}

impl Direction {
    /// Collapses any raw axis value to the three legal directions.
    pub fn from_axis(value: f64) -> Self {
        if value < 0.0 {
            Direction::Up
        } else if value > 0.0 {
            Direction::Down
        } else {
            // zero and NaN
            Direction::Idle
        }
    }

    pub fn axis(self) -> f32 {
        match self {
            Direction::Up => -1.0,
            Direction::Idle => 0.0,
            Direction::Down => 1.0,
        }
    }
}

impl From<f64> for Direction {
    fn from(value: f64) -> Self {
        Direction::from_axis(value)
    }
}

impl From<Direction> for i8 {
    fn from(direction: Direction) -> Self {
        direction.axis() as i8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Waiting,
    Countdown,
    Running,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    ScoreLimit,
    Forfeit,
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Paddle {
    /// Top edge, clamped to `[0, COURT_HEIGHT - PADDLE_HEIGHT]`.
    pub y: f32,
    pub direction: Direction,
}

impl Paddle {
    fn centered() -> Self {
        Self {
            y: (COURT_HEIGHT - PADDLE_HEIGHT) / 2.0,
            direction: Direction::Idle,
        }
    }

    pub fn covers(&self, y: f32) -> bool {
        y >= self.y && y <= self.y + PADDLE_HEIGHT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

impl Ball {
    pub fn speed(&self) -> f32 {
        (self.vx * self.vx + self.vy * self.vy).sqrt()
    }
}

/// Authoritative snapshot of one match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub paddles: [Paddle; 2],
    pub ball: Ball,
    pub scores: [u32; 2],
    pub phase: Phase,
    pub winner_slot: Option<Slot>,
    pub termination_reason: Option<TerminationReason>,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

impl GameState {
    pub fn new() -> Self {
        Self {
            paddles: [Paddle::centered(), Paddle::centered()],
            ball: Ball {
                x: COURT_WIDTH / 2.0,
                y: COURT_HEIGHT / 2.0,
                vx: BALL_SPEED,
                vy: BALL_SPEED * 0.6,
            },
            scores: [0, 0],
            phase: Phase::Waiting,
            winner_slot: None,
            termination_reason: None,
        }
    }

    pub fn set_direction(&mut self, slot: Slot, direction: Direction) {
        self.paddles[slot.index()].direction = direction;
    }

    pub fn score(&self, slot: Slot) -> u32 {
        self.scores[slot.index()]
    }

    /// Slot with the strictly higher score, if any.
    pub fn leader(&self) -> Option<Slot> {
        match self.scores[0].cmp(&self.scores[1]) {
            std::cmp::Ordering::Greater => Some(Slot::Left),
            std::cmp::Ordering::Less => Some(Slot::Right),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// What a call to [`step`] produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepOutcome {
    /// Slot that scored during this step.
    pub goal: Option<Slot>,
    /// Set when the goal brought the scorer to the score limit.
    pub winner: Option<Slot>,
}

/// Returns the slot that has reached `score_limit`, if either has.
pub fn winner(state: &GameState, score_limit: u32) -> Option<Slot> {
    Slot::BOTH
        .into_iter()
        .find(|slot| state.score(*slot) >= score_limit)
}

/// Number of substeps needed so the ball never moves further than half its radius
/// in one substep, which keeps it from tunnelling through a paddle.
pub fn required_substeps(speed: f32, dt: f32) -> u32 {
    const SAFETY_FACTOR: f32 = 0.5;

    let max_movement_per_step = BALL_RADIUS * SAFETY_FACTOR;
    let max_movement_this_tick = speed.max(PADDLE_SPEED) * dt;

    if max_movement_this_tick > max_movement_per_step {
        (max_movement_this_tick / max_movement_per_step).ceil() as u32
    } else {
        1
    }
}

/// Advances the simulation by `dt` seconds.
///
/// Scores change by at most one per call. When a goal brings the scorer to
/// `score_limit` the ball is left where it crossed the line and the outcome carries
/// the winner; otherwise the ball is served from the centre toward the scorer.
pub fn step<R: Rng + ?Sized>(
    state: &mut GameState,
    dt: f32,
    score_limit: u32,
    rng: &mut R,
) -> StepOutcome {
    let dt = if dt.is_finite() {
        dt.clamp(0.0, MAX_DELTA_TIME)
    } else {
        0.0
    };

    let substeps = required_substeps(state.ball.speed(), dt);
    let substep_dt = dt / substeps as f32;

    for _ in 0..substeps {
        move_paddles(state, substep_dt);

        if let Some(scorer) = advance_ball(state, substep_dt) {
            state.scores[scorer.index()] += 1;
            if state.score(scorer) >= score_limit {
                return StepOutcome {
                    goal: Some(scorer),
                    winner: Some(scorer),
                };
            }
            serve(&mut state.ball, scorer, rng);
            return StepOutcome {
                goal: Some(scorer),
                winner: None,
            };
        }
    }

    StepOutcome::default()
}

fn move_paddles(state: &mut GameState, dt: f32) {
    for paddle in &mut state.paddles {
        paddle.y = (paddle.y + paddle.direction.axis() * PADDLE_SPEED * dt)
            .clamp(0.0, COURT_HEIGHT - PADDLE_HEIGHT);
    }
}

/// Moves the ball and resolves wall and paddle contact. Returns the scoring slot
/// when the ball leaves the court.
fn advance_ball(state: &mut GameState, dt: f32) -> Option<Slot> {
    let ball = &mut state.ball;
    ball.x += ball.vx * dt;
    ball.y += ball.vy * dt;

    if ball.y - BALL_RADIUS <= 0.0 {
        ball.vy = ball.vy.abs();
        ball.y = BALL_RADIUS;
    } else if ball.y + BALL_RADIUS >= COURT_HEIGHT {
        ball.vy = -ball.vy.abs();
        ball.y = COURT_HEIGHT - BALL_RADIUS;
    }

    if ball.x - BALL_RADIUS <= LEFT_PADDLE_X + PADDLE_WIDTH {
        let paddle = state.paddles[Slot::Left.index()];
        if ball.vx < 0.0 && ball.x >= LEFT_PADDLE_X && paddle.covers(ball.y) {
            ball.vx = ball.vx.abs();
            ball.vy += paddle.direction.axis() * SPIN;
            accelerate(ball);
            ball.x = LEFT_PADDLE_X + PADDLE_WIDTH + BALL_RADIUS;
        } else if ball.x < 0.0 {
            return Some(Slot::Right);
        }
    }

    if ball.x + BALL_RADIUS >= RIGHT_PADDLE_X {
        let paddle = state.paddles[Slot::Right.index()];
        if ball.vx > 0.0 && ball.x <= RIGHT_PADDLE_X + PADDLE_WIDTH && paddle.covers(ball.y) {
            ball.vx = -ball.vx.abs();
            ball.vy += paddle.direction.axis() * SPIN;
            accelerate(ball);
            ball.x = RIGHT_PADDLE_X - BALL_RADIUS;
        } else if ball.x > COURT_WIDTH {
            return Some(Slot::Left);
        }
    }

    None
}

fn accelerate(ball: &mut Ball) {
    let speed = ball.speed();
    if speed <= f32::EPSILON {
        return;
    }
    let target = (speed * SPEED_UP).min(MAX_BALL_SPEED);
    let scale = target / speed;
    ball.vx *= scale;
    ball.vy *= scale;
}

/// Puts the ball back in the centre heading toward `towards` at a random shallow angle.
pub fn serve<R: Rng + ?Sized>(ball: &mut Ball, towards: Slot, rng: &mut R) {
    let heading = match towards {
        Slot::Left => -1.0,
        Slot::Right => 1.0,
    };
    let angle: f32 = rng.gen_range(-0.3..0.3);
    let boost: f32 = rng.gen_range(0.0..0.2);

    ball.x = COURT_WIDTH / 2.0;
    ball.y = COURT_HEIGHT / 2.0;
    ball.vx = heading * BALL_SPEED * (1.0 + boost);
    ball.vy = BALL_SPEED * angle.sin();
}
