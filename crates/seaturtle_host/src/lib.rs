use std::time::Duration;

use kurbo::{Affine, BezPath, PathEl, Point, Rect, Vec2};
use seaturtle::{Env, Span, Statement, TurtlePlayer};
use svg::node::element::{path::Data, Path};
use svg::Document;

/// Stroke colors, indexed by the `color` statement (modulo the length).
pub const PALETTE: &[&str] = &[
    "black", "red", "green", "blue", "orange", "purple", "brown", "gray",
];

/// The heading the turtle starts with, and returns to on `home`: straight up.
const HOME_HEADING: f64 = 90.0;

#[derive(Clone, Debug)]
pub struct Config {
    /// The drawing area. The turtle starts in its center.
    pub rect: Rect,
    pub line_width: f64,
    /// How long a turn or a move takes when playing back.
    pub step_time: Duration,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            rect: Rect::new(-200.0, -200.0, 200.0, 200.0),
            line_width: 1.0,
            step_time: Duration::from_millis(100),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    Turn(f64),
    Move(f64),
    Home,
    Pen(bool),
    Color(usize),
    Var(String, i64),
    Log(String),
}

/// One buffered event, with the span of the statement that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub op: Op,
    pub span: Span,
}

impl Step {
    /// Only the turtle's motion takes time; everything else happens instantly.
    pub fn duration(&self, step_time: Duration) -> Duration {
        match self.op {
            Op::Turn(_) | Op::Move(_) | Op::Home => step_time,
            Op::Pen(_) | Op::Color(_) | Op::Var(..) | Op::Log(_) => Duration::ZERO,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Turtle {
    pub pos: Point,
    /// In degrees, counter-clockwise from the positive x axis.
    pub heading: f64,
    pub pen_down: bool,
    pub color: usize,
}

/// A connected run of lines drawn with a single color.
#[derive(Clone, Debug)]
pub struct Stroke {
    pub path: BezPath,
    pub color: usize,
}

/// A player that buffers events into a timeline and draws them as they are played.
pub struct Canvas {
    config: Config,
    env: Env,
    steps: Vec<Step>,
    // Index of the next step to apply.
    next: usize,
    playing: bool,
    // Time accumulated towards the next step while playing.
    elapsed: Duration,
    turtle: Turtle,
    strokes: Vec<Stroke>,
    // Whether the last stroke can be extended by the next move.
    stroke_open: bool,
    output: Vec<String>,
}

impl Default for Canvas {
    fn default() -> Canvas {
        Canvas::new(Config::default())
    }
}

impl Canvas {
    pub fn new(config: Config) -> Canvas {
        let turtle = Canvas::home_turtle(&config);
        Canvas {
            config,
            env: Env::default(),
            steps: Vec::new(),
            next: 0,
            playing: false,
            elapsed: Duration::ZERO,
            turtle,
            strokes: Vec::new(),
            stroke_open: false,
            output: Vec::new(),
        }
    }

    fn home_turtle(config: &Config) -> Turtle {
        Turtle {
            pos: config.rect.center(),
            heading: HOME_HEADING,
            pen_down: true,
            color: 0,
        }
    }

    /// Clear everything and then run `source`, buffering its events. Nothing is drawn until the
    /// steps are played.
    pub fn load(&mut self, source: &str) -> Result<(), seaturtle::Error> {
        self.clear();
        let res = seaturtle::run(source, self);
        log::info!("buffered {} steps", self.steps.len());
        res
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn turtle(&self) -> &Turtle {
        &self.turtle
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// The lines printed so far.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_done(&self) -> bool {
        self.next >= self.steps.len()
    }

    /// The statement that produced the most recently applied step.
    pub fn current_span(&self) -> Option<Span> {
        self.next.checked_sub(1).map(|i| self.steps[i].span)
    }

    /// The total time that playing back every step takes.
    pub fn duration(&self) -> Duration {
        self.steps
            .iter()
            .map(|s| s.duration(self.config.step_time))
            .sum()
    }

    pub fn play(&mut self) {
        self.playing = !self.is_done();
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Apply the next step, if there is one. Returns `false` when there is nothing left to do.
    pub fn step(&mut self) -> bool {
        let Some(step) = self.steps.get(self.next).cloned() else {
            self.playing = false;
            return false;
        };
        self.next += 1;
        self.apply(&step.op);
        true
    }

    /// Let `dt` pass on the playback clock, applying every step that fits. Does nothing while
    /// paused. Returns the number of steps applied.
    pub fn tick(&mut self, dt: Duration) -> usize {
        if !self.playing {
            return 0;
        }
        self.elapsed += dt;
        let mut applied = 0;
        while let Some(step) = self.steps.get(self.next) {
            let needed = step.duration(self.config.step_time);
            if needed > self.elapsed {
                break;
            }
            self.elapsed -= needed;
            self.step();
            applied += 1;
        }
        if self.is_done() {
            self.playing = false;
            self.elapsed = Duration::ZERO;
        }
        applied
    }

    /// Apply every remaining step immediately.
    pub fn finish(&mut self) {
        while self.step() {}
    }

    /// Forget the program, its variables and subroutines, and everything drawn.
    pub fn clear(&mut self) {
        self.env.clear();
        self.steps.clear();
        self.next = 0;
        self.playing = false;
        self.elapsed = Duration::ZERO;
        self.turtle = Canvas::home_turtle(&self.config);
        self.strokes.clear();
        self.stroke_open = false;
        self.output.clear();
    }

    fn line_to(&mut self, from: Point, to: Point) {
        match self.strokes.last_mut() {
            Some(stroke) if self.stroke_open => stroke.path.line_to(to),
            _ => {
                let mut path = BezPath::new();
                path.move_to(from);
                path.line_to(to);
                self.strokes.push(Stroke {
                    path,
                    color: self.turtle.color,
                });
                self.stroke_open = true;
            }
        }
    }

    fn apply(&mut self, op: &Op) {
        log::debug!("{:?}", op);
        match op {
            Op::Turn(angle) => {
                self.turtle.heading = (self.turtle.heading + angle).rem_euclid(360.0);
            }
            Op::Move(dist) => {
                let from = self.turtle.pos;
                let to = from + Vec2::from_angle(self.turtle.heading.to_radians()) * *dist;
                if self.turtle.pen_down {
                    self.line_to(from, to);
                }
                self.turtle.pos = to;
            }
            Op::Home => {
                self.turtle.pos = self.config.rect.center();
                self.turtle.heading = HOME_HEADING;
                self.stroke_open = false;
            }
            Op::Pen(down) => {
                self.turtle.pen_down = *down;
                self.stroke_open = false;
            }
            Op::Color(color) => {
                self.turtle.color = *color;
                self.stroke_open = false;
            }
            Op::Var(name, val) => {
                log::debug!("{name} = {val}");
            }
            Op::Log(text) => self.output.push(text.clone()),
        }
    }

    fn buffer(&mut self, op: Op, source: &Statement) {
        self.steps.push(Step {
            op,
            span: source.span,
        });
    }

    /// Render what has been drawn so far. SVG is y-down, so the y axis gets flipped.
    pub fn to_svg(&self) -> Document {
        let rect = self.config.rect;
        let mut document = Document::new().set(
            "viewBox",
            (rect.min_x(), -rect.max_y(), rect.width(), rect.height()),
        );

        for stroke in &self.strokes {
            let mut path = stroke.path.clone();
            path.apply_affine(Affine::FLIP_Y);
            let mut data = Data::new();
            for el in path.elements() {
                data = match *el {
                    PathEl::MoveTo(p) => data.move_to((p.x, p.y)),
                    PathEl::LineTo(p) => data.line_to((p.x, p.y)),
                    _ => data,
                };
            }
            let path = Path::new()
                .set("fill", "none")
                .set("stroke", PALETTE[stroke.color])
                .set("stroke-width", self.config.line_width)
                .set("d", data);
            document = document.add(path);
        }
        document
    }

    pub fn save_svg(&self, path: impl AsRef<std::path::Path>) -> anyhow::Result<()> {
        svg::save(path, &self.to_svg())?;
        Ok(())
    }
}

impl TurtlePlayer for Canvas {
    fn env(&self) -> &Env {
        &self.env
    }

    fn env_mut(&mut self) -> &mut Env {
        &mut self.env
    }

    fn add_turn(&mut self, angle: i64, source: &Statement) {
        self.buffer(Op::Turn(angle as f64), source);
    }

    fn add_move(&mut self, distance: i64, source: &Statement) {
        self.buffer(Op::Move(distance as f64), source);
    }

    fn go_home(&mut self, source: &Statement) {
        self.buffer(Op::Home, source);
    }

    fn change_pen(&mut self, down: bool, source: &Statement) {
        self.buffer(Op::Pen(down), source);
    }

    fn change_color(&mut self, index: i64, source: &Statement) {
        let color = index.rem_euclid(PALETTE.len() as i64) as usize;
        if color as i64 != index {
            log::warn!("color {index} is out of range, using {color}");
        }
        self.buffer(Op::Color(color), source);
    }

    fn variable_changed(&mut self, name: &str, value: i64, source: &Statement) {
        self.buffer(Op::Var(name.to_owned(), value), source);
    }

    fn log(&mut self, text: &str, source: &Statement) {
        self.buffer(Op::Log(text.to_owned()), source);
    }
}
