//! Pooled XML parsing into the arena DOM
//!
//! A [`ParserPool`] hands out exclusively-owned parser states; the guard
//! returned by [`ParserPool::acquire`] puts its state back when dropped, so a
//! failed parse never leaks a pooled parser.

use super::{new_document, Document, DocumentRef, NodeId};
use crate::error::{Error, ParseError, Result};
use crate::limits::Limits;
use crate::names;
use crate::namespaces::{resolve_prefix, Namespace, NamespaceContext, QName};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::Read;
use std::sync::Mutex;
use tracing::{debug, trace};

/// Default number of idle parser states kept by a pool
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Reusable per-parse state
#[derive(Debug, Default)]
struct ParserState {
    buf: Vec<u8>,
    scopes: Vec<NamespaceContext>,
}

impl ParserState {
    fn reset(&mut self) {
        self.buf.clear();
        self.scopes.clear();
    }
}

/// A bounded pool of XML parsers sharing one configuration
#[derive(Debug)]
pub struct ParserPool {
    limits: Limits,
    allow_doctype: bool,
    max_idle: usize,
    idle: Mutex<Vec<ParserState>>,
}

impl Default for ParserPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserPool {
    /// Create a pool with default limits; DOCTYPE declarations are rejected
    pub fn new() -> Self {
        Self::with_limits(Limits::default())
    }

    /// Create a pool enforcing the given limits
    pub fn with_limits(limits: Limits) -> Self {
        Self {
            limits,
            allow_doctype: false,
            max_idle: DEFAULT_POOL_SIZE,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Allow documents carrying a DOCTYPE declaration.
    ///
    /// Only the predefined entities are ever expanded.
    pub fn allow_doctype(mut self, allow: bool) -> Self {
        self.allow_doctype = allow;
        self
    }

    /// Set the maximum number of idle parser states kept for reuse
    pub fn max_pool_size(mut self, size: usize) -> Self {
        self.max_idle = size;
        self
    }

    /// The limits enforced by this pool
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Number of idle parser states currently pooled
    pub fn idle_count(&self) -> usize {
        self.idle.lock().map(|v| v.len()).unwrap_or_else(|e| e.into_inner().len())
    }

    /// Take an exclusively-owned parser out of the pool
    pub fn acquire(&self) -> PooledParser<'_> {
        let state = {
            let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
            idle.pop()
        };
        PooledParser {
            pool: self,
            state: Some(state.unwrap_or_default()),
        }
    }

    fn release(&self, mut state: ParserState) {
        state.reset();
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        if idle.len() < self.max_idle {
            idle.push(state);
        }
    }

    /// Parse a complete document from bytes
    pub fn parse(&self, input: &[u8]) -> Result<DocumentRef> {
        self.acquire().parse(input)
    }

    /// Read and parse a complete document, refusing oversized input
    pub fn parse_reader<R: Read>(&self, reader: R) -> Result<DocumentRef> {
        let cap = self.limits.max_xml_size as u64 + 1;
        let mut bytes = Vec::new();
        reader.take(cap).read_to_end(&mut bytes)?;
        self.parse(&bytes)
    }
}

/// A parser checked out of a [`ParserPool`]
#[derive(Debug)]
pub struct PooledParser<'a> {
    pool: &'a ParserPool,
    state: Option<ParserState>,
}

impl Drop for PooledParser<'_> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            self.pool.release(state);
        }
    }
}

fn parse_error(reader_pos: usize, message: impl Into<String>) -> Error {
    Error::Parse(ParseError::new(message).with_location(format!("byte {}", reader_pos)))
}

fn utf8(bytes: &[u8], pos: usize) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| parse_error(pos, format!("invalid UTF-8: {}", e)))
}

impl PooledParser<'_> {
    /// Parse a complete document from bytes
    pub fn parse(&mut self, input: &[u8]) -> Result<DocumentRef> {
        let limits = self.pool.limits.clone();
        let allow_doctype = self.pool.allow_doctype;
        limits.check_xml_size(input.len())?;

        let state = self.state.get_or_insert_with(ParserState::default);
        state.reset();

        let mut doc = Document::new();
        let mut reader = Reader::from_reader(input);
        reader.trim_text(false);
        reader.expand_empty_elements(false);

        let mut stack: Vec<NodeId> = Vec::new();

        loop {
            let pos = reader.buffer_position();
            let event = reader
                .read_event_into(&mut state.buf)
                .map_err(|e| parse_error(pos, e.to_string()))?;
            match event {
                Event::Start(ref start) => {
                    let node = open_element(&mut doc, &mut state.scopes, &stack, start, &limits, pos)?;
                    stack.push(node);
                    limits.check_xml_depth(stack.len())?;
                }
                Event::Empty(ref start) => {
                    open_element(&mut doc, &mut state.scopes, &stack, start, &limits, pos)?;
                    limits.check_xml_depth(stack.len() + 1)?;
                    state.scopes.pop();
                }
                Event::End(_) => {
                    stack.pop();
                    state.scopes.pop();
                }
                Event::Text(ref text) => {
                    let value = text
                        .unescape()
                        .map_err(|e| parse_error(pos, e.to_string()))?;
                    match stack.last() {
                        Some(&parent) => {
                            let node = doc.create_text(value.into_owned());
                            doc.append_child(parent, node)?;
                        }
                        None if value.trim().is_empty() => {}
                        None => {
                            return Err(parse_error(pos, "character data outside the document element"))
                        }
                    }
                }
                Event::CData(ref data) => {
                    let value = utf8(data, pos)?.to_string();
                    let parent = stack
                        .last()
                        .copied()
                        .ok_or_else(|| parse_error(pos, "CDATA outside the document element"))?;
                    let node = doc.create_text(value);
                    doc.append_child(parent, node)?;
                }
                Event::Comment(ref comment) => {
                    let value = utf8(comment, pos)?.to_string();
                    let parent = stack.last().copied().unwrap_or_else(|| doc.root());
                    let node = doc.create_comment(value);
                    doc.append_child(parent, node)?;
                }
                Event::DocType(_) => {
                    if !allow_doctype {
                        return Err(parse_error(pos, "DOCTYPE declarations are not allowed"));
                    }
                    trace!("ignoring DOCTYPE declaration");
                }
                Event::Decl(_) | Event::PI(_) => {}
                Event::Eof => break,
            }
            state.buf.clear();
        }

        if !stack.is_empty() {
            return Err(parse_error(reader.buffer_position(), "unexpected end of input"));
        }
        if doc.document_element().is_none() {
            return Err(parse_error(0, "document has no root element"));
        }
        debug!(bytes = input.len(), "parsed XML document");

        let shared = new_document();
        *shared.borrow_mut() = doc;
        Ok(shared)
    }
}

fn open_element(
    doc: &mut Document,
    scopes: &mut Vec<NamespaceContext>,
    stack: &[NodeId],
    start: &BytesStart<'_>,
    limits: &Limits,
    pos: usize,
) -> Result<NodeId> {
    if stack.is_empty() && doc.document_element().is_some() {
        return Err(parse_error(pos, "multiple root elements"));
    }

    let raw_name = utf8(start.name().as_ref(), pos)?.to_string();
    names::validate_qname(&raw_name)?;

    let mut scope = NamespaceContext::new();
    let mut decls = Vec::new();
    let mut raw_attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| parse_error(pos, e.to_string()))?;
        let key = utf8(attr.key.as_ref(), pos)?.to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| parse_error(pos, e.to_string()))?
            .into_owned();
        if key == "xmlns" {
            decls.push(Namespace::new(value, None::<String>));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            names::validate_ncname(prefix)?;
            if value.is_empty() {
                return Err(parse_error(pos, format!("prefix '{}' bound to empty namespace", prefix)));
            }
            decls.push(Namespace::new(value, Some(prefix)));
        } else {
            raw_attributes.push((key, value));
        }
    }
    limits.check_attributes(raw_attributes.len())?;
    limits.check_namespaces(decls.len())?;
    for decl in &decls {
        scope.declare(decl);
    }
    scopes.push(scope);

    let (prefix, local) = names::split_qname(&raw_name);
    let namespace = resolve_prefix(scopes, prefix)?;
    let name = QName::new(namespace, local).with_prefix(prefix.map(str::to_string));

    let node = doc.create_element(name);
    for decl in decls {
        doc.declare_namespace(node, decl)?;
    }
    for (key, value) in raw_attributes {
        names::validate_qname(&key)?;
        let (attr_prefix, attr_local) = names::split_qname(&key);
        let attr_ns = match attr_prefix {
            Some(_) => resolve_prefix(scopes, attr_prefix)?,
            None => None,
        };
        let attr_name = QName::new(attr_ns, attr_local).with_prefix(attr_prefix.map(str::to_string));
        if doc.attribute(node, &attr_name).is_some() {
            return Err(parse_error(pos, format!("duplicate attribute {}", attr_name)));
        }
        doc.set_attribute(node, attr_name, value)?;
    }

    match stack.last() {
        Some(&parent) => doc.append_child(parent, node)?,
        None => doc.set_document_element(node)?,
    }
    Ok(node)
}
