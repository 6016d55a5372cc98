use quick_xml::events::Event;
use quick_xml::name::{QName, ResolveResult};
use quick_xml::NsReader;

/// Literal per-entry values that `feed-rs` normalizes away.
///
/// `feed-rs` synthesizes an id when an item has no `<guid>`, only exposes
/// durations it could parse, and drops publish dates it could not parse.
/// Deduplication and duration parsing need the literal text.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct EntryExtensions {
    /// `<guid>` (RSS) or `<id>` (Atom) text; empty when absent
    pub guid: String,
    itunes_duration: Option<String>,
    plain_duration: Option<String>,
    /// `<pubDate>` (RSS) or `<published>` (Atom) text
    pub published: Option<String>,
}

impl EntryExtensions {
    /// `itunes:duration` wins over an unprefixed `duration`.
    pub fn duration(&self) -> Option<&str> {
        self.itunes_duration
            .as_deref()
            .or(self.plain_duration.as_deref())
    }

    fn record(&mut self, field: Field, text: String) {
        match field {
            Field::Guid if self.guid.is_empty() => self.guid = text,
            Field::ItunesDuration if self.itunes_duration.is_none() => {
                self.itunes_duration = Some(text)
            }
            Field::PlainDuration if self.plain_duration.is_none() => {
                self.plain_duration = Some(text)
            }
            Field::Published if self.published.is_none() => self.published = Some(text),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Guid,
    ItunesDuration,
    PlainDuration,
    Published,
}

const RSS_NS: &[u8] = b"http://purl.org/rss/1.0/";
const ATOM_NS: &[u8] = b"http://www.w3.org/2005/Atom";
const ITUNES_NS: &[u8] = b"http://www.itunes.com/dtds/podcast-1.0.dtd";

/// Namespace an element resolved to. `Default` means no namespace was bound,
/// which feed-rs reads as the namespace of the feed format.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Ns {
    Default,
    Rss,
    Atom,
    Itunes,
    Other,
}

impl Ns {
    fn of(resolved: &ResolveResult) -> Ns {
        match resolved {
            ResolveResult::Unbound => Ns::Default,
            ResolveResult::Bound(ns) => match ns.as_ref() {
                RSS_NS => Ns::Rss,
                ATOM_NS => Ns::Atom,
                ITUNES_NS => Ns::Itunes,
                _ => Ns::Other,
            },
            ResolveResult::Unknown(_) => Ns::Other,
        }
    }

    fn is_feed_vocabulary(self) -> bool {
        matches!(self, Ns::Default | Ns::Rss | Ns::Atom)
    }
}

/// Elements whose direct children may be entries.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Container {
    /// `<rss>` root; only holds channels
    Rss,
    /// First `<channel>` under `<rss>`
    Channel,
    /// Atom `<feed>` root
    Feed,
    /// RSS 1.0 `<rdf:RDF>` root
    Rdf,
}

fn field_for(name: QName, ns: Ns) -> Option<Field> {
    let itunes_prefix = name.prefix().is_some_and(|p| p.as_ref() == b"itunes");
    match name.local_name().as_ref() {
        b"duration" if ns == Ns::Itunes || itunes_prefix => Some(Field::ItunesDuration),
        b"duration" if name.prefix().is_none() => Some(Field::PlainDuration),
        _ if !ns.is_feed_vocabulary() => None,
        b"guid" | b"id" => Some(Field::Guid),
        b"pubDate" | b"published" => Some(Field::Published),
        _ => None,
    }
}

/// The container the next element would be a direct child of. The document
/// itself accepts a lone Atom `<entry>`.
fn parent_container(open: &[Option<Container>]) -> Option<Container> {
    match open.last() {
        None => Some(Container::Feed),
        Some(slot) => *slot,
    }
}

fn is_entry_element(parent: Option<Container>, local_name: &[u8], ns: Ns) -> bool {
    match parent {
        Some(Container::Channel | Container::Rdf) => {
            local_name == b"item" && matches!(ns, Ns::Default | Ns::Rss)
        }
        Some(Container::Feed) => local_name == b"entry" && matches!(ns, Ns::Default | Ns::Atom),
        Some(Container::Rss) | None => false,
    }
}

fn container_for(
    open: &[Option<Container>],
    local_name: &[u8],
    seen_channel: &mut bool,
) -> Option<Container> {
    match (open.len(), local_name) {
        (0, b"rss") => Some(Container::Rss),
        (0, b"feed") => Some(Container::Feed),
        (0, b"RDF") => Some(Container::Rdf),
        (1, b"channel") if open[0] == Some(Container::Rss) && !*seen_channel => {
            *seen_channel = true;
            Some(Container::Channel)
        }
        _ => None,
    }
}

/// Scan feed XML for the literal extension values of each feed-level
/// `<item>`/`<entry>`, in document order.
///
/// Entries are counted the way feed-rs finds them: items in the first RSS
/// `<channel>` or under `<rdf:RDF>`, entries directly under an Atom `<feed>`.
/// Stray items elsewhere in the document are skipped, so positions line up
/// with the parsed entries. Only direct children of an entry are read, so
/// nested `<source>` ids in Atom are ignored.
///
/// Stops at the first XML error and returns the entries completed so far.
///
/// SEC-002: quick-xml (0.37) never expands `<!ENTITY>` declarations, so
/// untrusted feeds cannot trigger XXE through this pass.
pub(crate) fn scan_entry_extensions(bytes: &[u8]) -> Vec<EntryExtensions> {
    let mut reader = NsReader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut entries = Vec::new();
    // One slot per open element
    let mut open: Vec<Option<Container>> = Vec::new();
    let mut seen_channel = false;
    let mut current: Option<(usize, EntryExtensions)> = None;
    let mut capture: Option<(Field, String)> = None;

    loop {
        match reader.read_resolved_event_into(&mut buf) {
            Ok((resolved, Event::Start(e))) => {
                let ns = Ns::of(&resolved);
                let name = e.name();
                match current.as_ref().map(|(d, _)| *d) {
                    Some(d) => {
                        if open.len() == d {
                            capture = field_for(name, ns).map(|f| (f, String::new()));
                        }
                        open.push(None);
                    }
                    None => {
                        let local = name.local_name();
                        if is_entry_element(parent_container(&open), local.as_ref(), ns) {
                            open.push(None);
                            current = Some((open.len(), EntryExtensions::default()));
                        } else {
                            let container = container_for(&open, local.as_ref(), &mut seen_channel);
                            open.push(container);
                        }
                    }
                }
            }
            Ok((resolved, Event::Empty(e))) => {
                // <item/> still occupies a position in the entry list
                let ns = Ns::of(&resolved);
                if current.is_none()
                    && is_entry_element(parent_container(&open), e.local_name().as_ref(), ns)
                {
                    entries.push(EntryExtensions::default());
                }
            }
            Ok((_, Event::Text(t))) => {
                if let Some((_, text)) = capture.as_mut() {
                    match t.unescape() {
                        Ok(s) => text.push_str(&s),
                        Err(_) => text.push_str(&String::from_utf8_lossy(&t)),
                    }
                }
            }
            Ok((_, Event::CData(c))) => {
                if let Some((_, text)) = capture.as_mut() {
                    text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok((_, Event::End(_))) => {
                match current.as_ref().map(|(d, _)| *d) {
                    Some(d) if open.len() == d + 1 => {
                        if let (Some((field, text)), Some((_, ext))) =
                            (capture.take(), current.as_mut())
                        {
                            ext.record(field, text.trim().to_string());
                        }
                    }
                    Some(d) if open.len() == d => {
                        if let Some((_, ext)) = current.take() {
                            entries.push(ext);
                        }
                    }
                    _ => {}
                }
                open.pop();
            }
            Ok((_, Event::Eof)) => break,
            Err(e) => {
                tracing::debug!(
                    error = %e,
                    recovered = entries.len(),
                    "Stopped extension scan at XML error"
                );
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    entries
}
