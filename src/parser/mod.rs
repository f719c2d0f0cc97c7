//! Graph Parser Module
//! Parses the Mermaid-like state machine DSL into graphs

use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;

use crate::fsm::{Graph, StateId};


#[derive(Parser)]
#[grammar = "parser/graph.pest"]
pub struct GraphParser;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Parse error: {0}")]
    PestError(#[from] pest::error::Error<Rule>),
    #[error("Invalid syntax at line {line}: {message}")]
    SyntaxError { line: usize, message: String },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Condition name of a transition written without a label
pub const DEFAULT_CONDITION: &str = "condition";

/// Parse DSL source into graphs, in file order
pub fn parse_graphs(source: &str) -> ParseResult<Vec<Graph>> {
    let pairs = GraphParser::parse(Rule::file, source)?;
    let mut graphs: Vec<Graph> = Vec::new();

    for pair in pairs.flatten().filter(|p| p.as_rule() == Rule::graph) {
        let line = line_of(&pair);
        let graph = parse_graph(pair)?;
        if graphs.iter().any(|g| g.name == graph.name) {
            return Err(ParseError::SyntaxError {
                line,
                message: format!("fsm {} defined twice", graph.name),
            });
        }
        graphs.push(graph);
    }

    Ok(graphs)
}

/// Parse source that must hold exactly one graph
pub fn parse_graph_source(source: &str) -> ParseResult<Graph> {
    let mut graphs = parse_graphs(source)?;
    match graphs.len() {
        1 => Ok(graphs.remove(0)),
        n => Err(ParseError::SyntaxError {
            line: 1,
            message: format!("expected one fsm, found {}", n),
        }),
    }
}

fn line_of(pair: &Pair<Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

/// Next inner pair, which the grammar guarantees is present
fn next_pair<'a>(
    inner: &mut Pairs<'a, Rule>,
    line: usize,
    what: &str,
) -> ParseResult<Pair<'a, Rule>> {
    inner.next().ok_or_else(|| ParseError::SyntaxError {
        line,
        message: format!("missing {}", what),
    })
}

fn parse_graph(pair: Pair<Rule>) -> ParseResult<Graph> {
    let line = line_of(&pair);
    let mut inner = pair.into_inner();
    let _keyword = next_pair(&mut inner, line, "fsm keyword")?;
    let name = next_pair(&mut inner, line, "fsm name")?.as_str();

    let mut graph = Graph::new(name);
    for item in inner {
        match item.as_rule() {
            Rule::initial => parse_initial(item, &mut graph)?,
            Rule::state_decl => parse_state_decl(item, &mut graph)?,
            Rule::transition => parse_transition(item, &mut graph)?,
            _ => {}
        }
    }

    if graph.initial_state().is_none() {
        log::debug!("fsm {} has no [*] arrow", graph.name);
    }
    Ok(graph)
}

/// The state called `name`, created on first mention
fn state_named(graph: &mut Graph, name: &str) -> StateId {
    match graph.state_by_name(name) {
        Some(state) => state.id(),
        None => graph.add_state(name),
    }
}

fn graph_error(line: usize, error: crate::fsm::GraphError) -> ParseError {
    ParseError::SyntaxError {
        line,
        message: error.to_string(),
    }
}

fn parse_initial(pair: Pair<Rule>, graph: &mut Graph) -> ParseResult<()> {
    let line = line_of(&pair);
    let mut inner = pair.into_inner();
    let name = next_pair(&mut inner, line, "initial state")?.as_str();
    let id = state_named(graph, name);
    graph.set_initial(id).map_err(|e| graph_error(line, e))
}

fn parse_state_decl(pair: Pair<Rule>, graph: &mut Graph) -> ParseResult<()> {
    let line = line_of(&pair);
    let mut inner = pair.into_inner();
    let _keyword = next_pair(&mut inner, line, "state keyword")?;
    let name = next_pair(&mut inner, line, "state name")?.as_str();
    let id = state_named(graph, name);

    if let Some(description) = inner.next() {
        graph
            .set_description(id, Some(unquote(description)))
            .map_err(|e| graph_error(line, e))?;
    }
    Ok(())
}

fn parse_transition(pair: Pair<Rule>, graph: &mut Graph) -> ParseResult<()> {
    let line = line_of(&pair);
    let mut inner = pair.into_inner();

    let source = next_pair(&mut inner, line, "source state")?.as_str();
    let target = next_pair(&mut inner, line, "target state")?.as_str();
    let source = state_named(graph, source);
    let target = state_named(graph, target);

    let condition = match inner.next() {
        Some(name) => parse_name(name),
        None => DEFAULT_CONDITION.to_string(),
    };
    let transition = graph
        .add_transition(source, target, condition)
        .map_err(|e| graph_error(line, e))?;

    if let Some(actions) = inner.next() {
        for action in actions.into_inner() {
            graph
                .add_action(transition, parse_name(action))
                .map_err(|e| graph_error(line, e))?;
        }
    }
    Ok(())
}

/// A `name` pair: either a bare identifier or a quoted string
fn parse_name(pair: Pair<Rule>) -> String {
    match pair.into_inner().next() {
        Some(inner) if inner.as_rule() == Rule::string => unquote(inner),
        Some(inner) => inner.as_str().to_string(),
        None => String::new(),
    }
}

/// Contents of a `string` pair with escapes resolved
fn unquote(pair: Pair<Rule>) -> String {
    let raw = pair
        .into_inner()
        .next()
        .map(|inner| inner.as_str())
        .unwrap_or_default();

    let mut result = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some(other) => result.push(other),
            None => {}
        }
    }
    result
}
