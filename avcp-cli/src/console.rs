//! Line commands typed at the `watch` prompt.

use anyhow::{anyhow, bail, Result};
use control_point::content::NodeId;
use control_point::{ControlHandle, DeviceClass, DeviceSummary, InsertPosition, PlayKind, Row};

pub const HELP: &str = "\
servers | renderers          list devices
use server|renderer <n>      select device <n> of the last listing
ls                           list the current library folder
cd <n> | cd ..               enter row <n> / go up
play|add|insert <n>...       replace queue / append / insert at the top
search <text>                search the active server
results                      list search results
queue                        list the renderer queue
start|pause|stop|next|prev   transport
vol <n> | mute on|off        volume
seek <seconds> | jump <row>  position
repeat on|off | shuffle on|off
rm <row>... | mv <row>... <to> | clear
save <name>                  copy the queue into a local playlist
quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Devices(DeviceClass),
    Use(DeviceClass, usize),
    List,
    Enter(usize),
    Up,
    Play(PlayKind, Vec<usize>),
    Search(String),
    Results,
    Queue,
    Start,
    Pause,
    Stop,
    Next,
    Previous,
    Volume(u32),
    Mute(bool),
    Seek(u32),
    Jump(usize),
    Repeat(bool),
    Shuffle(bool),
    Remove(Vec<usize>),
    Move(Vec<usize>, usize),
    Clear,
    Save(String),
    Help,
    Quit,
}

fn numbers<T: std::str::FromStr>(words: &[&str]) -> Result<Vec<T>> {
    words
        .iter()
        .map(|w| w.parse().map_err(|_| anyhow!("not a number: {w}")))
        .collect()
}

fn number<T: std::str::FromStr>(words: &[&str]) -> Result<T> {
    match words {
        [word] => word.parse().map_err(|_| anyhow!("not a number: {word}")),
        _ => bail!("expected one number"),
    }
}

fn switch(words: &[&str]) -> Result<bool> {
    match words {
        ["on"] => Ok(true),
        ["off"] => Ok(false),
        _ => bail!("expected on or off"),
    }
}

fn class(word: &str) -> Result<DeviceClass> {
    match word {
        "server" | "servers" => Ok(DeviceClass::MediaServer),
        "renderer" | "renderers" => Ok(DeviceClass::Renderer),
        other => bail!("unknown device class: {other}"),
    }
}

/// Parse one input line. Empty lines are `None`.
pub fn parse_line(input: &str) -> Result<Option<Line>> {
    let words: Vec<&str> = input.split_whitespace().collect();
    let Some((command, args)) = words.split_first() else {
        return Ok(None);
    };

    let line = match *command {
        "servers" | "renderers" if args.is_empty() => Line::Devices(class(command)?),
        "use" => match args {
            [which, index] => Line::Use(class(which)?, number(&[*index])?),
            _ => bail!("usage: use server|renderer <n>"),
        },
        "ls" => Line::List,
        "cd" => match args {
            [".."] => Line::Up,
            _ => Line::Enter(number(args)?),
        },
        "play" | "add" | "insert" => {
            let kind = match *command {
                "play" => PlayKind::ReplaceAndPlay,
                "add" => PlayKind::Append,
                _ => PlayKind::Insert,
            };
            let rows = numbers(args)?;
            if rows.is_empty() {
                bail!("usage: {command} <n>...");
            }
            Line::Play(kind, rows)
        }
        "search" => Line::Search(args.join(" ")),
        "results" => Line::Results,
        "queue" => Line::Queue,
        "start" => Line::Start,
        "pause" => Line::Pause,
        "stop" => Line::Stop,
        "next" => Line::Next,
        "prev" => Line::Previous,
        "vol" => Line::Volume(number(args)?),
        "mute" => Line::Mute(switch(args)?),
        "seek" => Line::Seek(number(args)?),
        "jump" => Line::Jump(number(args)?),
        "repeat" => Line::Repeat(switch(args)?),
        "shuffle" => Line::Shuffle(switch(args)?),
        "rm" => Line::Remove(numbers(args)?),
        "mv" => match args.split_last() {
            Some((to, rows)) if !rows.is_empty() => Line::Move(numbers(rows)?, number(&[*to])?),
            _ => bail!("usage: mv <row>... <to>"),
        },
        "clear" => Line::Clear,
        "save" if !args.is_empty() => Line::Save(args.join(" ")),
        "help" | "?" => Line::Help,
        "quit" | "exit" => Line::Quit,
        other => bail!("unknown command: {other} (try help)"),
    };
    Ok(Some(line))
}

/// Interactive state: the last listings that row numbers refer to.
pub struct Console {
    handle: ControlHandle,
    path: Vec<NodeId>,
    rows: Vec<Row>,
    servers: Vec<DeviceSummary>,
    renderers: Vec<DeviceSummary>,
}

impl Console {
    pub fn new(handle: ControlHandle) -> Self {
        Self {
            handle,
            path: Vec::new(),
            rows: Vec::new(),
            servers: Vec::new(),
            renderers: Vec::new(),
        }
    }

    /// Run one command. Returns `false` when the user asked to quit.
    pub async fn execute(&mut self, line: Line) -> Result<bool> {
        match line {
            Line::Devices(class) => {
                let devices = self.handle.devices(class).await?;
                for (index, device) in devices.iter().enumerate() {
                    let marker = if device.active { '*' } else { ' ' };
                    println!("{marker}{index:>3}  {}  ({})", device.name, device.uuid);
                }
                match class {
                    DeviceClass::MediaServer => self.servers = devices,
                    DeviceClass::Renderer => self.renderers = devices,
                }
            }
            Line::Use(class, index) => {
                let listing = match class {
                    DeviceClass::MediaServer => &self.servers,
                    DeviceClass::Renderer => &self.renderers,
                };
                let uuid = listing
                    .get(index)
                    .map(|d| d.uuid.clone())
                    .ok_or_else(|| anyhow!("no {class} {index} in the last listing"))?;
                self.handle.set_active_device(class, uuid).await?;
                if class == DeviceClass::MediaServer {
                    self.path.clear();
                    self.rows.clear();
                }
            }
            Line::List => self.list(DeviceClass::MediaServer, self.path.last().copied()).await?,
            Line::Enter(index) => {
                let (node, has_children) = self.row(index).map(|r| (r.node, r.has_children))?;
                if !has_children {
                    bail!("row {index} is not a folder");
                }
                self.handle.fetch_more(node)?;
                self.path.push(node);
                self.list(DeviceClass::MediaServer, Some(node)).await?;
            }
            Line::Up => {
                self.path.pop();
                self.list(DeviceClass::MediaServer, self.path.last().copied()).await?;
            }
            Line::Play(kind, indices) => {
                let selection = indices
                    .iter()
                    .map(|i| self.row(*i).map(|r| r.node))
                    .collect::<Result<Vec<_>>>()?;
                let position = match kind {
                    PlayKind::Insert => InsertPosition::AfterId(0),
                    _ => InsertPosition::End,
                };
                self.handle.play(selection, position, kind)?;
            }
            Line::Search(text) => self.handle.search(text)?,
            Line::Results => {
                let root = self
                    .handle
                    .search_root()
                    .await?
                    .ok_or_else(|| anyhow!("the active server cannot search"))?;
                self.list(DeviceClass::MediaServer, Some(root)).await?;
            }
            Line::Queue => self.list(DeviceClass::Renderer, None).await?,
            Line::Start => self.handle.transport_play()?,
            Line::Pause => self.handle.transport_pause()?,
            Line::Stop => self.handle.transport_stop()?,
            Line::Next => self.handle.transport_next()?,
            Line::Previous => self.handle.transport_previous()?,
            Line::Volume(volume) => self.handle.set_volume(volume)?,
            Line::Mute(muted) => self.handle.set_mute(muted)?,
            Line::Seek(seconds) => self.handle.seek(seconds)?,
            Line::Jump(row) => self.handle.seek_row(row)?,
            Line::Repeat(repeat) => self.handle.set_repeat(repeat)?,
            Line::Shuffle(shuffle) => self.handle.set_shuffle(shuffle)?,
            Line::Remove(rows) => self.handle.remove_tracks(rows)?,
            Line::Move(rows, to) => self.handle.move_tracks(rows, to)?,
            Line::Clear => self.handle.clear_queue()?,
            Line::Save(name) => self.handle.save_queue_as_playlist(name)?,
            Line::Help => println!("{HELP}"),
            Line::Quit => return Ok(false),
        }
        Ok(true)
    }

    fn row(&self, index: usize) -> Result<&Row> {
        self.rows
            .get(index)
            .ok_or_else(|| anyhow!("no row {index} in the last listing"))
    }

    async fn list(&mut self, class: DeviceClass, node: Option<NodeId>) -> Result<()> {
        let rows = self.handle.rows(class, node).await?;
        if rows.is_empty() {
            println!("(empty, or still loading)");
        }
        for (index, row) in rows.iter().enumerate() {
            let folder = if row.has_children { '/' } else { ' ' };
            match &row.data.sub_text {
                Some(sub) => println!("{index:>4}  {}{folder}  {sub}", row.data.display_text),
                None => println!("{index:>4}  {}{folder}", row.data.display_text),
            }
        }
        if class == DeviceClass::MediaServer {
            self.rows = rows;
        }
        Ok(())
    }
}
