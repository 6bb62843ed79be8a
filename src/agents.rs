//! Question routing.
//!
//! ```text
//!                  ┌──────────────────┐
//!   question ───▶  │ supervisor_agent │  hand-off tools only
//!                  └───┬──────────┬───┘
//!     transfer_to_sql_agent    transfer_to_rag_agent
//!                      ▼          ▼
//!               ┌───────────┐ ┌───────────┐
//!               │ sql_agent │ │ rag_agent │
//!               └───────────┘ └───────────┘
//!               four SQL tools  report retrieval
//! ```
//!
//! The supervisor decides which agent gets the question and does no work
//! itself. One agent runs at a time: when a reply carries several
//! hand-off calls only the first is honoured and the others are answered
//! with a refusal. The delegated agent runs on the original question and
//! its final message is appended to the supervisor's conversation.
//!
//! The answer is every assistant message with text and no tool calls,
//! joined in order.

use anyhow::{anyhow, bail, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::Config;
use crate::db;
use crate::llm::{create_chat_model, ChatMessage, ChatModel, ToolCall, ToolSpec};
use crate::tools::{rag_tools, sql_tools, Tool, ToolContext};

pub const SUPERVISOR_NAME: &str = "supervisor_agent";
pub const SQL_AGENT: &str = "sql_agent";
pub const RAG_AGENT: &str = "rag_agent";

const SQL_HANDOFF: &str = "transfer_to_sql_agent";
const RAG_HANDOFF: &str = "transfer_to_rag_agent";

/// System prompt of the SQL agent.
pub fn sql_prompt(dialect: &str, top_k: usize) -> String {
    format!(
        "You are an agent designed to interact with a SQL database.\n\
         Given an input question, create a syntactically correct {dialect} query to run, \
         then look at the results of the query and return the answer. Unless the user \
         specifies a specific number of examples they wish to obtain, always limit your \
         query to at most {top_k} results.\n\n\
         You can order the results by a relevant column to return the most interesting \
         examples in the database. Never query for all the columns from a specific table, \
         only ask for the relevant columns given the question.\n\n\
         You MUST double check your query before executing it. If you get an error while \
         executing a query, rewrite the query and try again.\n\n\
         DO NOT make any DML statements (INSERT, UPDATE, DELETE, DROP etc.) to the database.\n\n\
         To start you should ALWAYS look at the tables in the database to see what you \
         can query. Do NOT skip this step.\n\n\
         Then you should query the schema of the most relevant tables."
    )
}

pub const RAG_PROMPT: &str = "You are an agent designed to answer questions about NAAC Peer Team Reports of different colleges.\n\
Use the provided tools to retrieve information.\n\
The name of the college may not always be accurate.\n\
You can retrieve information from similar college names and filter the results.";

pub const SUPERVISOR_PROMPT: &str = "You are a supervisor managing two agents:\n\
- an sql agent. Assign tasks to this agent only if you feel that the question needs to query a database\n\
- a RAG agent. Assign tasks to this agent only if you feel that the question cannot be answered using queries to a database\n\
Assign work to one agent at a time, do not call agents in parallel.\n\
Do not do any work yourself.";

/// A tool-calling loop around one system prompt.
pub struct ReactAgent {
    pub name: String,
    pub prompt: String,
    pub tools: Vec<Arc<dyn Tool>>,
    pub max_steps: usize,
}

impl ReactAgent {
    pub fn new(name: &str, prompt: String, tools: Vec<Arc<dyn Tool>>, max_steps: usize) -> Self {
        Self {
            name: name.to_string(),
            prompt,
            tools,
            max_steps,
        }
    }

    /// Run until the model answers without tool calls. Returns the
    /// assistant and tool messages produced; the last one is the answer.
    pub async fn run(
        &self,
        model: &dyn ChatModel,
        ctx: &ToolContext,
        question: &str,
    ) -> Result<Vec<ChatMessage>> {
        let specs: Vec<ToolSpec> = self.tools.iter().map(|t| t.spec()).collect();
        let mut messages = vec![ChatMessage::system(&self.prompt), ChatMessage::user(question)];
        let start = messages.len();

        for _ in 0..self.max_steps {
            let mut reply = model.complete(&messages, &specs).await?;
            reply.role = "assistant".to_string();
            reply.name = Some(self.name.clone());
            let calls = reply.tool_calls.clone();
            messages.push(reply);

            if calls.is_empty() {
                return Ok(messages.split_off(start));
            }

            for call in &calls {
                let output = self.call_tool(call, ctx).await;
                messages.push(ChatMessage::tool(&call.id, &call.function.name, output));
            }
        }

        bail!(
            "{} did not produce an answer within {} steps",
            self.name,
            self.max_steps
        )
    }

    /// Tool output as text. Failures become text too so the model can retry.
    async fn call_tool(&self, call: &ToolCall, ctx: &ToolContext) -> String {
        let Some(tool) = self.tools.iter().find(|t| t.name() == call.function.name) else {
            return format!(
                "Error: {} is not a valid tool, try one of [{}].",
                call.function.name,
                self.tools
                    .iter()
                    .map(|t| t.name().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        };

        let result = match call.arguments() {
            Ok(params) => tool.execute(params, ctx).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(Value::String(s)) => s,
            Ok(other) => other.to_string(),
            Err(e) => format!("Error: {:#}", e),
        }
    }
}

/// Answer to one question.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RouterAnswer {
    pub answer: String,
    /// Agents that ran, in order.
    pub agents: Vec<String>,
}

/// Joins every assistant message that has text and no tool calls.
pub fn assemble_answer(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .filter(|m| m.is_final_answer())
        .filter_map(|m| m.text())
        .collect::<Vec<_>>()
        .join("\n")
}

fn handoff_spec(name: &str, agent: &str) -> ToolSpec {
    ToolSpec {
        name: name.to_string(),
        description: format!("Ask agent '{}' for help", agent),
        parameters: json!({ "type": "object", "properties": {} }),
    }
}

pub struct Router {
    model: Arc<dyn ChatModel>,
    ctx: ToolContext,
    sql: ReactAgent,
    rag: ReactAgent,
    max_steps: usize,
}

impl Router {
    pub fn new(model: Arc<dyn ChatModel>, ctx: ToolContext) -> Self {
        let llm = &ctx.config.llm;
        let sql = ReactAgent::new(
            SQL_AGENT,
            sql_prompt("sqlite", llm.sql_top_k),
            sql_tools(),
            llm.max_steps,
        );
        let rag = ReactAgent::new(RAG_AGENT, RAG_PROMPT.to_string(), rag_tools(), llm.max_steps);
        let max_steps = llm.max_steps;
        Self {
            model,
            ctx,
            sql,
            rag,
            max_steps,
        }
    }

    /// Router over the configured model and database.
    pub async fn from_config(config: Arc<Config>) -> Result<Self> {
        let model = create_chat_model(&config.llm)?;
        let pool = db::connect(&config).await?;
        let read_only = db::connect_read_only(&config).await?;
        Ok(Self::new(model, ToolContext::new(config, pool, read_only)))
    }

    fn agent_for(&self, handoff: &str) -> Option<&ReactAgent> {
        match handoff {
            SQL_HANDOFF => Some(&self.sql),
            RAG_HANDOFF => Some(&self.rag),
            _ => None,
        }
    }

    pub async fn ask(&self, question: &str) -> Result<RouterAnswer> {
        let question = question.trim();
        if question.is_empty() {
            bail!("question must not be empty");
        }

        let specs = vec![
            handoff_spec(SQL_HANDOFF, SQL_AGENT),
            handoff_spec(RAG_HANDOFF, RAG_AGENT),
        ];
        let mut conversation = vec![
            ChatMessage::system(SUPERVISOR_PROMPT),
            ChatMessage::user(question),
        ];
        let mut agents = Vec::new();

        for _ in 0..self.max_steps {
            let mut reply = self.model.complete(&conversation, &specs).await?;
            reply.role = "assistant".to_string();
            reply.name = Some(SUPERVISOR_NAME.to_string());
            let calls = reply.tool_calls.clone();
            conversation.push(reply);

            let Some((first, rest)) = calls.split_first() else {
                return Ok(RouterAnswer {
                    answer: assemble_answer(&conversation[2..]),
                    agents,
                });
            };

            let agent = self.agent_for(&first.function.name);
            let first_output = match agent {
                Some(a) => format!("Successfully transferred to {}", a.name),
                None => format!(
                    "Error: {} is not a valid tool, try one of [{}, {}].",
                    first.function.name, SQL_HANDOFF, RAG_HANDOFF
                ),
            };
            conversation.push(ChatMessage::tool(&first.id, &first.function.name, first_output));
            for extra in rest {
                conversation.push(ChatMessage::tool(
                    &extra.id,
                    &extra.function.name,
                    "Refused: assign work to one agent at a time. Only the first transfer was executed.",
                ));
            }

            let Some(agent) = agent else {
                continue;
            };

            let produced = agent.run(self.model.as_ref(), &self.ctx, question).await?;
            let last = produced
                .last()
                .cloned()
                .ok_or_else(|| anyhow!("{} returned no messages", agent.name))?;
            agents.push(agent.name.clone());
            conversation.push(last);
        }

        bail!(
            "{} did not finish within {} steps",
            SUPERVISOR_NAME,
            self.max_steps
        )
    }
}
