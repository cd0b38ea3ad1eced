use crate::error::WorldError;
use crate::types::Vec2;

const CLASSIC_ROWS: [&str; 21] = [
    "###################",
    "#o.......#.......o#",
    "#.##.###.#.###.##.#",
    "#.................#",
    "#.##.#.#####.#.##.#",
    "#....#...#...#....#",
    "####.### # ###.####",
    "####.#       #.####",
    "####.# ##P## #.####",
    "T...  #PPPPP#  ...T",
    "####.# ##### #.####",
    "####.#       #.####",
    "####.# ##### #.####",
    "#........#........#",
    "#.##.###.#.###.##.#",
    "#o.#...........#.o#",
    "##.#.#.#####.#.#.##",
    "#....#...#...#....#",
    "#.######.#.######.#",
    "#.................#",
    "###################",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cell {
    Wall,
    Empty,
    Pellet,
    PowerPellet,
    Tunnel,
    Pen,
}

impl Cell {
    fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            '#' => Some(Cell::Wall),
            ' ' => Some(Cell::Empty),
            '.' => Some(Cell::Pellet),
            'o' => Some(Cell::PowerPellet),
            'T' => Some(Cell::Tunnel),
            'P' => Some(Cell::Pen),
            _ => None,
        }
    }

    /// Glyph shown to clients. Tunnel and pen markers render as open floor.
    pub fn render(self) -> char {
        match self {
            Cell::Wall => '#',
            Cell::Pellet => '.',
            Cell::PowerPellet => 'o',
            Cell::Empty | Cell::Tunnel | Cell::Pen => ' ',
        }
    }

    pub fn is_pellet(self) -> bool {
        matches!(self, Cell::Pellet | Cell::PowerPellet)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grid {
    width: i32,
    height: i32,
    cells: Vec<Cell>,
}

impl Grid {
    pub fn parse<S: AsRef<str>>(rows: &[S]) -> Result<Self, WorldError> {
        let Some(first) = rows.first() else {
            return Err(WorldError::Empty);
        };
        let width = first.as_ref().chars().count();
        if width == 0 {
            return Err(WorldError::Empty);
        }

        let mut cells = Vec::with_capacity(width * rows.len());
        for (y, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            let found = row.chars().count();
            if found != width {
                return Err(WorldError::RaggedRow {
                    row: y,
                    expected: width,
                    found,
                });
            }
            for (x, symbol) in row.chars().enumerate() {
                let cell = Cell::from_symbol(symbol).ok_or(WorldError::UnknownSymbol {
                    symbol,
                    x: x as i32,
                    y: y as i32,
                })?;
                cells.push(cell);
            }
        }

        Ok(Self {
            width: width as i32,
            height: rows.len() as i32,
            cells,
        })
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn get(&self, x: i32, y: i32) -> Option<Cell> {
        self.index(x, y).map(|idx| self.cells[idx])
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        Some((y * self.width + x) as usize)
    }
}

/// Reference layout plus the mutable copy pellets are eaten from. Both always
/// share dimensions; only `current` is ever written.
#[derive(Clone, Debug)]
pub struct World {
    reference: Grid,
    current: Grid,
}

impl World {
    pub fn new(reference: Grid) -> Self {
        Self {
            current: reference.clone(),
            reference,
        }
    }

    pub fn width(&self) -> i32 {
        self.reference.width
    }

    pub fn height(&self) -> i32 {
        self.reference.height
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        self.reference.index(x, y).is_some()
    }

    pub fn is_wall(&self, x: i32, y: i32) -> bool {
        self.reference.get(x, y).is_none_or(|cell| cell == Cell::Wall)
    }

    pub fn is_tunnel_cell(&self, x: i32, y: i32) -> bool {
        self.reference.get(x, y).is_none_or(|cell| cell == Cell::Tunnel)
    }

    pub fn is_pen_cell(&self, x: i32, y: i32) -> bool {
        self.reference.get(x, y).is_none_or(|cell| cell == Cell::Pen)
    }

    /// Horizontal wraparound for one step past either edge. Vertical overflow
    /// is left alone so it reads as a wall.
    pub fn wrap_coordinate(&self, x: i32, y: i32) -> (i32, i32) {
        let width = self.width();
        if x == -1 {
            (width - 1, y)
        } else if x == width {
            (0, y)
        } else {
            (x, y)
        }
    }

    pub fn count_remaining_pellets(&self) -> usize {
        self.current
            .cells
            .iter()
            .filter(|cell| cell.is_pellet())
            .count()
    }

    /// Clears a pellet or power pellet and returns what was eaten. A cell
    /// yields at most once per round.
    pub fn consume(&mut self, x: i32, y: i32) -> Option<Cell> {
        let idx = self.current.index(x, y)?;
        let cell = self.current.cells[idx];
        if !cell.is_pellet() {
            return None;
        }
        self.current.cells[idx] = Cell::Empty;
        Some(cell)
    }

    pub fn current_cell(&self, x: i32, y: i32) -> Option<Cell> {
        self.current.get(x, y)
    }

    pub fn reset(&mut self) {
        self.current = self.reference.clone();
    }

    pub fn render_rows(&self) -> Vec<Vec<char>> {
        self.current
            .cells
            .chunks(self.current.width as usize)
            .map(|row| row.iter().map(|cell| cell.render()).collect())
            .collect()
    }
}

/// A maze plus the anchor points the engine places entities on.
#[derive(Clone, Debug)]
pub struct MazeLayout {
    pub rows: Vec<String>,
    pub pacman_spawns: Vec<Vec2>,
    pub ghost_spawns: Vec<Vec2>,
    pub pen_spawns: Vec<Vec2>,
    pub scatter_corners: Vec<Vec2>,
    pub patrol_waypoints: Vec<Vec2>,
    pub pen_exit: Vec2,
    pub fruit_spawn: Vec2,
}

impl MazeLayout {
    pub fn classic() -> Self {
        Self {
            rows: CLASSIC_ROWS.iter().map(|row| row.to_string()).collect(),
            pacman_spawns: vec![
                Vec2::new(9, 15),
                Vec2::new(1, 19),
                Vec2::new(17, 19),
                Vec2::new(9, 3),
            ],
            ghost_spawns: vec![
                Vec2::new(7, 9),
                Vec2::new(11, 9),
                Vec2::new(8, 9),
                Vec2::new(10, 9),
            ],
            pen_spawns: vec![
                Vec2::new(9, 9),
                Vec2::new(8, 9),
                Vec2::new(10, 9),
                Vec2::new(9, 8),
            ],
            scatter_corners: vec![
                Vec2::new(17, 1),
                Vec2::new(1, 1),
                Vec2::new(17, 19),
                Vec2::new(1, 19),
            ],
            patrol_waypoints: vec![
                Vec2::new(4, 3),
                Vec2::new(14, 3),
                Vec2::new(4, 17),
                Vec2::new(14, 17),
            ],
            pen_exit: Vec2::new(9, 7),
            fruit_spawn: Vec2::new(9, 11),
        }
    }

    pub fn build_world(&self) -> Result<World, WorldError> {
        let world = World::new(Grid::parse(&self.rows)?);

        let anchor_sets: [(&'static str, &[Vec2]); 5] = [
            ("pac-man spawn", &self.pacman_spawns),
            ("ghost spawn", &self.ghost_spawns),
            ("pen spawn", &self.pen_spawns),
            ("scatter corner", &self.scatter_corners),
            ("patrol waypoint", &self.patrol_waypoints),
        ];
        for (what, anchors) in anchor_sets {
            if anchors.is_empty() {
                return Err(WorldError::MissingAnchors(what));
            }
            if let Some(at) = anchors.iter().find(|at| world.is_wall(at.x, at.y)) {
                return Err(WorldError::BlockedAnchor { what, at: *at });
            }
        }
        if let Some(at) = self
            .pacman_spawns
            .iter()
            .find(|at| world.is_pen_cell(at.x, at.y))
        {
            return Err(WorldError::BlockedAnchor {
                what: "pac-man spawn",
                at: *at,
            });
        }
        for (what, at) in [("pen exit", self.pen_exit), ("fruit spawn", self.fruit_spawn)] {
            if world.is_wall(at.x, at.y) {
                return Err(WorldError::BlockedAnchor { what, at });
            }
        }

        Ok(world)
    }
}
