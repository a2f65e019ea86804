//! The stateful walker behind every pretty-print.
//!
//! One `Traversal` carries the depth, breadth, and cycle state for a single
//! top-level `repr` call. It is single-threaded; queries that print from
//! scan callbacks create one traversal per visited object.

use std::collections::HashSet;

use crate::addr::MappedAddr;
use crate::env::Environment;
use crate::types::{
    asyncobj, code, dict, frame, module, scalars, seq, set, strings, thread, typeobj,
    ObjectHeader, Reason, TypeKind,
};

/// Formatting knobs shared by every command that prints object
/// representations.
#[derive(Debug, Clone, Copy)]
pub struct ReprOptions {
    /// Depth at which containers stop descending; negative means no limit.
    pub max_recursion_depth: i64,
    /// Children printed per container before an ellipsis; negative means
    /// no limit.
    pub max_entries: i64,
    /// Characters (or bytes) printed per string object.
    pub max_string_length: usize,
    /// Append `@ADDR` to every rendered object.
    pub show_all_addresses: bool,
    /// Render a frame's back pointer as an address instead of recursing.
    pub frame_omit_back: bool,
    /// Always render bytes objects as hex escapes.
    pub bytes_as_hex: bool,
    /// Omit less-frequently-relevant fields on some objects.
    pub is_short: bool,
}

impl Default for ReprOptions {
    fn default() -> Self {
        Self {
            max_recursion_depth: 16,
            max_entries: 64,
            max_string_length: 1024,
            show_all_addresses: false,
            frame_omit_back: false,
            bytes_as_hex: false,
            is_short: false,
        }
    }
}

pub struct Traversal<'e> {
    env: &'e Environment,
    pub opts: ReprOptions,
    /// Current descent depth; also the indent unit for multiline output.
    pub recursion_depth: i64,
    /// Cleared when any visited object fails validation, so callers can
    /// drop partial output.
    pub is_valid: bool,
    cycle_set: HashSet<u64>,
}

impl<'e> Traversal<'e> {
    pub fn new(env: &'e Environment, opts: ReprOptions) -> Self {
        Self {
            env,
            opts,
            recursion_depth: 0,
            is_valid: true,
            cycle_set: HashSet::new(),
        }
    }

    pub fn env(&self) -> &'e Environment {
        self.env
    }

    /// Validate and record the outcome in `is_valid`.
    pub fn check_valid(&mut self, addr: MappedAddr) -> Option<Reason> {
        let reason = self.env.invalid_reason(addr);
        if reason.is_some() {
            self.is_valid = false;
        }
        reason
    }

    fn recursion_allowed(&self) -> bool {
        self.opts.max_recursion_depth < 0 || self.recursion_depth < self.opts.max_recursion_depth
    }

    fn at_entry_limit(&self, printed: usize) -> bool {
        self.opts.max_entries >= 0 && printed >= self.opts.max_entries as usize
    }

    fn indent(&self, depth: i64) -> String {
        " ".repeat((depth.max(0) as usize) * 2)
    }

    /// Render the object at `addr`, dispatching on its type-of pointer.
    pub fn repr(&mut self, addr: MappedAddr) -> String {
        if addr.is_null() {
            return "NULL".to_string();
        }
        let Ok(header) = ObjectHeader::read(self.env, addr) else {
            self.is_valid = false;
            return format!("<@{} !unreadable>", addr);
        };
        let Some(kind) = self.env.kind_of(header.type_of) else {
            self.is_valid = false;
            return format!("<type@0x{:016X} !unknown>", header.type_of.get());
        };

        let out = match kind {
            TypeKind::None | TypeKind::Bool | TypeKind::Int | TypeKind::Float => {
                self.repr_scalar(addr, kind)
            }
            TypeKind::Str => self.repr_str(addr),
            TypeKind::Bytes => self.repr_bytes(addr),
            TypeKind::Type => self.repr_type(addr),
            TypeKind::Tuple => self.repr_sequence(addr, kind),
            TypeKind::List => self.repr_sequence(addr, kind),
            TypeKind::Dict => self.repr_dict(addr),
            TypeKind::Set => self.repr_set(addr),
            TypeKind::Module => self.repr_module(addr),
            TypeKind::Code => self.repr_code(addr),
            TypeKind::Frame => self.repr_frame(addr),
            TypeKind::Task | TypeKind::Future | TypeKind::GatheringFuture => {
                self.repr_async(addr, kind)
            }
        };
        if self.opts.show_all_addresses {
            format!("{}@{}", out, addr)
        } else {
            out
        }
    }

    fn repr_scalar(&mut self, addr: MappedAddr, kind: TypeKind) -> String {
        if let Some(reason) = self.check_valid(addr) {
            return format!("<{} !{}>", label(kind), reason);
        }
        match scalars::repr(self.env, addr, kind) {
            Ok(text) => text,
            Err(_) => {
                self.is_valid = false;
                format!("<{} !unreadable>", label(kind))
            }
        }
    }

    fn repr_str(&mut self, addr: MappedAddr) -> String {
        if let Some(reason) = self.check_valid(addr) {
            return format!("<str !{}>", reason);
        }
        match strings::decode_str(self.env, addr) {
            Ok(text) => strings::quote_str(&text, self.opts.max_string_length),
            Err(_) => {
                self.is_valid = false;
                "<str !unreadable>".to_string()
            }
        }
    }

    fn repr_bytes(&mut self, addr: MappedAddr) -> String {
        if let Some(reason) = self.check_valid(addr) {
            return format!("<bytes !{}>", reason);
        }
        match strings::bytes_data(self.env, addr) {
            Ok(data) => {
                strings::quote_bytes(data, self.opts.max_string_length, self.opts.bytes_as_hex)
            }
            Err(_) => {
                self.is_valid = false;
                "<bytes !unreadable>".to_string()
            }
        }
    }

    fn repr_type(&mut self, addr: MappedAddr) -> String {
        if let Some(reason) = self.check_valid(addr) {
            return format!("<type !{}>", reason);
        }
        match typeobj::TypeObject::read(self.env, addr)
            .and_then(|ty| ty.name(self.env.store()))
        {
            Ok(name) => format!("<type {}>", name),
            Err(_) => "<type !invalid_type_name>".to_string(),
        }
    }

    fn repr_sequence(&mut self, addr: MappedAddr, kind: TypeKind) -> String {
        let tag = label(kind);
        if let Some(reason) = self.check_valid(addr) {
            return format!("<{} !{}>", tag, reason);
        }
        let items = match kind {
            TypeKind::Tuple => seq::tuple_items(self.env, addr),
            _ => seq::list_items(self.env, addr),
        };
        let Ok(items) = items else {
            return format!("<{} !items_unreadable>", tag);
        };

        if self.cycle_set.contains(&addr.get()) {
            return format!("<{} !recursive_repr>", tag);
        }
        if !self.recursion_allowed() {
            return format!("<{} !recursion_depth len={}>", tag, items.len());
        }

        self.cycle_set.insert(addr.get());
        self.recursion_depth += 1;

        let mut entries = Vec::new();
        let mut has_extra = false;
        for item in &items {
            if self.at_entry_limit(entries.len()) {
                has_extra = true;
                break;
            }
            entries.push(self.repr(*item));
        }

        let (open, close) = match kind {
            TypeKind::Tuple => ("(", ")"),
            _ => ("[", "]"),
        };
        let out = if entries.is_empty() && !has_extra {
            format!("{}{}", open, close)
        } else if entries.len() == 1 && !has_extra {
            if kind == TypeKind::Tuple {
                format!("({},)", entries[0])
            } else {
                format!("[{}]", entries[0])
            }
        } else {
            let mut out = format!("{}\n", open);
            for entry in &entries {
                out.push_str(&self.indent(self.recursion_depth));
                out.push_str(entry);
                out.push_str(",\n");
            }
            if has_extra {
                out.push_str(&self.indent(self.recursion_depth));
                out.push_str("...\n");
            }
            out.push_str(&self.indent(self.recursion_depth - 1));
            out.push_str(close);
            out
        };

        self.recursion_depth -= 1;
        self.cycle_set.remove(&addr.get());
        out
    }

    fn repr_dict(&mut self, addr: MappedAddr) -> String {
        if let Some(reason) = self.check_valid(addr) {
            return format!("<dict !{}>", reason);
        }
        let Ok(items) = dict::get_items(self.env, addr) else {
            return "<dict keys:!unreadable>".to_string();
        };
        let Ok(dict_obj) = dict::DictObject::read(self.env, addr) else {
            return "<dict !unreadable>".to_string();
        };

        if self.cycle_set.contains(&addr.get()) {
            return "<dict !recursive_repr>".to_string();
        }
        if !self.recursion_allowed() {
            return format!("<dict !recursion_depth len={}>", dict_obj.used);
        }

        self.cycle_set.insert(addr.get());
        self.recursion_depth += 1;

        let mut entries: Vec<(String, String)> = Vec::new();
        let mut has_extra = false;
        for (key, value) in &items {
            if self.at_entry_limit(entries.len()) {
                has_extra = true;
                break;
            }
            let key_repr = self.repr(*key);
            let value_repr = self.repr(*value);
            entries.push((key_repr, value_repr));
        }

        let out = if entries.is_empty() && !has_extra {
            "{}".to_string()
        } else if entries.len() == 1 && !has_extra {
            format!("{{{}: {}}}", entries[0].0, entries[0].1)
        } else {
            // Sorted by the textual form of the key so output is
            // deterministic regardless of table order.
            entries.sort();
            let mut out = "{\n".to_string();
            for (key, value) in &entries {
                out.push_str(&self.indent(self.recursion_depth));
                out.push_str(key);
                out.push_str(": ");
                out.push_str(value);
                out.push_str(",\n");
            }
            if has_extra {
                out.push_str(&self.indent(self.recursion_depth));
                out.push_str("...\n");
            }
            out.push_str(&self.indent(self.recursion_depth - 1));
            out.push('}');
            out
        };

        self.recursion_depth -= 1;
        self.cycle_set.remove(&addr.get());
        out
    }

    fn repr_set(&mut self, addr: MappedAddr) -> String {
        if let Some(reason) = self.check_valid(addr) {
            return format!("<set !{}>", reason);
        }
        let Ok(items) = set::get_items(self.env, addr) else {
            return "<set !table_unreadable>".to_string();
        };

        if self.cycle_set.contains(&addr.get()) {
            return "<set !recursive_repr>".to_string();
        }
        if !self.recursion_allowed() {
            return format!("<set !recursion_depth len={}>", items.len());
        }

        self.cycle_set.insert(addr.get());
        self.recursion_depth += 1;

        let mut entries = Vec::new();
        let mut has_extra = false;
        for item in &items {
            if self.at_entry_limit(entries.len()) {
                has_extra = true;
                break;
            }
            entries.push(self.repr(*item));
        }

        let out = if entries.is_empty() && !has_extra {
            "set()".to_string()
        } else if entries.len() == 1 && !has_extra {
            format!("{{{}}}", entries[0])
        } else {
            entries.sort();
            let mut out = "{\n".to_string();
            for entry in &entries {
                out.push_str(&self.indent(self.recursion_depth));
                out.push_str(entry);
                out.push_str(",\n");
            }
            if has_extra {
                out.push_str(&self.indent(self.recursion_depth));
                out.push_str("...\n");
            }
            out.push_str(&self.indent(self.recursion_depth - 1));
            out.push('}');
            out
        };

        self.recursion_depth -= 1;
        self.cycle_set.remove(&addr.get());
        out
    }

    fn repr_module(&mut self, addr: MappedAddr) -> String {
        if let Some(reason) = self.check_valid(addr) {
            return format!("<module !{}>", reason);
        }
        let name = match module::module_name(self.env, addr) {
            Ok(Some(name)) => strings::quote_str(&name, self.opts.max_string_length),
            Ok(None) => "!unnamed".to_string(),
            Err(_) => "!dict_unreadable".to_string(),
        };
        if self.opts.is_short {
            return format!("<module {}>", name);
        }
        match module::ModuleObject::read(self.env, addr) {
            Ok(m) => format!("<module {} dict=@{}>", name, m.dict),
            Err(_) => format!("<module {}>", name),
        }
    }

    fn repr_code(&mut self, addr: MappedAddr) -> String {
        if let Some(reason) = self.check_valid(addr) {
            return format!("<code !{}>", reason);
        }
        let Ok(code_obj) = code::CodeObject::read(self.env, addr) else {
            return "<code !unreadable>".to_string();
        };
        let name = self.repr(code_obj.name);
        let filename = self.repr(code_obj.filename);
        format!(
            "<code {} {}:{}>",
            name, filename, code_obj.firstlineno
        )
    }

    fn repr_frame(&mut self, addr: MappedAddr) -> String {
        if let Some(reason) = self.check_valid(addr) {
            return format!("<frame !{}>", reason);
        }
        let Ok(f) = frame::FrameObject::read(self.env, addr) else {
            return "<frame !unreadable>".to_string();
        };

        if self.cycle_set.contains(&addr.get()) {
            return "<frame !recursive_repr>".to_string();
        }
        if !self.recursion_allowed() {
            return "<frame !recursion_depth>".to_string();
        }
        self.cycle_set.insert(addr.get());
        self.recursion_depth += 1;

        let mut tokens = Vec::new();
        tokens.push(f.state_name());
        tokens.push(format!("where={}", self.frame_where(&f)));
        if !self.opts.is_short {
            if self.opts.frame_omit_back {
                tokens.push(format!("f_back=@{}", f.back));
            } else {
                tokens.push(format!("f_back={}", self.repr(f.back)));
            }
            tokens.push(format!("f_code={}", self.repr(f.code)));
            tokens.push(format!("f_builtins=@{}", f.builtins));
            tokens.push(format!("f_globals=@{}", f.globals));
            tokens.push(format!("f_locals={}", self.repr(f.locals)));
            tokens.push(format!("f_valuestack=@{}", f.valuestack));
            tokens.push(format!("f_trace={}", self.repr(f.trace)));
            tokens.push(format!("f_stackdepth={}", f.stackdepth));
            tokens.push(format!("f_gen={}", self.repr(f.gen)));
            tokens.push(format!("f_lasti={}", f.lasti));
            tokens.push(format!("f_lineno={}", f.lineno));
            tokens.push(format!("f_iblock={}", f.iblock));

            match frame::locals(self.env, addr) {
                Ok(pairs) => {
                    let mut entries: Vec<String> = pairs
                        .iter()
                        .map(|(name, value)| {
                            format!("{}={}", self.repr(*name), self.repr(*value))
                        })
                        .collect();
                    entries.sort();
                    tokens.push(format!("locals={{{}}}", entries.join(", ")));
                }
                Err(_) => tokens.push("locals=!unreadable".to_string()),
            }
        }

        self.recursion_depth -= 1;
        self.cycle_set.remove(&addr.get());
        format!("<frame {}>", tokens.join(" "))
    }

    /// `"filename":line` for a frame, tolerating missing code objects.
    fn frame_where(&mut self, f: &frame::FrameObject) -> String {
        if f.code.is_null() {
            return "!no_code".to_string();
        }
        match code::CodeObject::read(self.env, f.code) {
            Ok(code_obj) => {
                let filename = self.repr(code_obj.filename);
                format!("{}:{}", filename, f.lineno)
            }
            Err(_) => "!code_unreadable".to_string(),
        }
    }

    fn repr_async(&mut self, addr: MappedAddr, kind: TypeKind) -> String {
        let tag = label(kind);
        if let Some(reason) = self.check_valid(addr) {
            return format!("<{} !{}>", tag, reason);
        }
        let Ok(fut) = asyncobj::FutureObject::read(self.env, addr, kind) else {
            return format!("<{} !unreadable>", tag);
        };
        let state = fut.state_name();
        match kind {
            TypeKind::Task => {
                format!("<{} {} coro=@{} fut_waiter=@{}>", tag, state, fut.coro, fut.waiter)
            }
            TypeKind::GatheringFuture => {
                let count = asyncobj::children(self.env, addr)
                    .map(|c| c.len().to_string())
                    .unwrap_or_else(|_| "!unreadable".to_string());
                format!("<{} {} children={}>", tag, state, count)
            }
            _ => {
                if !self.opts.is_short && fut.state == asyncobj::STATE_FINISHED {
                    let result = self.repr(fut.result);
                    format!("<{} {} result={}>", tag, state, result)
                } else {
                    format!("<{} {}>", tag, state)
                }
            }
        }
    }
}

/// Short tag used in `<T ...>` output.
fn label(kind: TypeKind) -> &'static str {
    match kind {
        TypeKind::Task => "Task",
        TypeKind::Future => "Future",
        TypeKind::GatheringFuture => "GatheringFuture",
        other => other.name(),
    }
}

/// Render a thread state. Thread states carry no object header, so they
/// are not reachable through the normal dispatch.
pub fn repr_thread(t: &mut Traversal<'_>, addr: MappedAddr) -> String {
    if let Some(reason) = thread::validate(t.env(), addr) {
        t.is_valid = false;
        return format!("<thread !{}>", reason);
    }
    let Ok(ts) = thread::ThreadState::read(t.env(), addr) else {
        t.is_valid = false;
        return format!("<thread @{} !unreadable>", addr);
    };
    let frame_repr = t.repr(ts.frame);
    format!("<thread id={} frame={}>", ts.thread_id, frame_repr)
}
