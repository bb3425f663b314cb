//! Template engine based on MiniJinja

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use cairn_core::TemplateContext;
use cairn_node::{LookupProvider, NullLookup};
use minijinja::{Environment, UndefinedBehavior, Value, context};

use crate::definitions::{DEFINITIONS_TEMPLATE, Definitions};
use crate::discovery::Discovery;
use crate::error::{EngineError, Origin, Result, TemplateError};
use crate::filters;
use crate::functions;

/// A template file: the name used in diagnostics plus its text
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSource {
    pub name: String,
    pub content: String,
}

impl TemplateSource {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    pub fn load(path: &Path, name: impl Into<String>) -> Result<Self> {
        Ok(Self::new(name, std::fs::read_to_string(path)?))
    }
}

/// Rendered text of one template
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFragment {
    pub name: String,
    pub content: String,
}

/// Template engine builder
pub struct EngineBuilder {
    strict: bool,
    provider: Option<Arc<dyn LookupProvider>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            strict: false,
            provider: None,
        }
    }

    /// Fail on undefined variables instead of rendering them empty
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Provider backing `lookup` and the `discovered_*` helpers
    pub fn lookup(mut self, provider: Arc<dyn LookupProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            strict: self.strict,
            provider: self.provider.unwrap_or_else(|| Arc::new(NullLookup)),
        }
    }
}

/// The template engine
pub struct Engine {
    strict: bool,
    provider: Arc<dyn LookupProvider>,
}

impl Engine {
    /// Engine with lookups disabled
    pub fn new(strict: bool) -> Self {
        Self::builder().strict(strict).build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn is_live(&self) -> bool {
        self.provider.is_live()
    }

    /// Node facts as seen by this engine's templates
    pub fn discovery(&self, context: &TemplateContext) -> Discovery {
        let floating_ip = context
            .values
            .get("floatingIP")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Discovery::new(Arc::clone(&self.provider)).with_floating_ip(floating_ip)
    }

    fn create_environment(&self, context: &TemplateContext, discovery: &Discovery) -> Environment<'static> {
        let mut env = Environment::new();

        env.set_undefined_behavior(if self.strict {
            UndefinedBehavior::Strict
        } else {
            UndefinedBehavior::Chainable
        });
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);

        env.add_filter("toyaml", filters::toyaml);
        env.add_filter("tojson", filters::tojson);
        env.add_filter("tojson_pretty", filters::tojson_pretty);
        env.add_filter("fromyaml", filters::fromyaml);
        env.add_filter("fromjson", filters::fromjson);
        env.add_filter("b64encode", filters::b64encode);
        env.add_filter("b64decode", filters::b64decode);
        env.add_filter("quote", filters::quote);
        env.add_filter("squote", filters::squote);
        env.add_filter("nindent", filters::nindent);
        env.add_filter("indent", filters::indent);
        env.add_filter("required", filters::required);
        env.add_filter("empty", filters::empty);
        env.add_filter("haskey", filters::haskey);
        env.add_filter("keys", filters::keys);
        env.add_filter("merge", filters::merge);
        env.add_filter("sha256", filters::sha256sum);
        env.add_filter("trunc", filters::trunc);
        env.add_filter("trimprefix", filters::trimprefix);
        env.add_filter("trimsuffix", filters::trimsuffix);
        env.add_filter("snakecase", filters::snakecase);
        env.add_filter("kebabcase", filters::kebabcase);
        env.add_filter("camelcase", filters::camelcase);
        env.add_filter("human_size", filters::human_size);
        env.add_filter("regex_replace", filters::regex_replace);
        env.add_filter("tostrings", filters::tostrings);
        env.add_filter("semver_match", filters::semver_match);

        env.add_function("fail", functions::fail);
        env.add_function("dict", functions::dict);
        env.add_function("list", functions::list);
        env.add_function("get", functions::get);
        env.add_function("set", functions::set);
        env.add_function("unset", functions::unset);
        env.add_function("dig", functions::dig);
        env.add_function("coalesce", functions::coalesce);
        env.add_function("ternary", functions::ternary);
        env.add_function("tostring", functions::tostring);
        env.add_function("toint", functions::toint);
        env.add_function("printf", functions::printf);
        env.add_function("regex_match", functions::regex_match);
        env.add_function("has", functions::has);
        env.add_function("include", functions::include);
        env.add_function("tpl", functions::tpl);
        env.add_function("tpl_ctx", functions::tpl_ctx);

        discovery.register(&mut env);

        env.add_global("values", Value::from_serialize(&context.values));
        env.add_global("chart", Value::from_serialize(&context.chart));
        env.add_global("versions", Value::from_serialize(&context.versions));
        env.add_global("machine_type", Value::from(context.machine_type.clone()));

        env
    }

    /// Render `templates` in order, with the named blocks of `library` and of
    /// the templates themselves visible to each of them
    ///
    /// Every file is parsed before anything renders. Any failure discards
    /// all output.
    pub fn render(
        &self,
        library: &[TemplateSource],
        templates: &[TemplateSource],
        context: &TemplateContext,
    ) -> Result<Vec<RenderedFragment>> {
        let discovery = self.discovery(context);

        let context = if context.machine_type.is_empty() {
            context.clone().with_machine_type(discovery.machine_type()?)
        } else {
            context.clone()
        };

        let mut env = self.create_environment(&context, &discovery);

        let mut sources: HashMap<&str, &str> = HashMap::new();
        for source in library.iter().chain(templates) {
            env.add_template_owned(source.name.clone(), source.content.clone())
                .map_err(|e| {
                    EngineError::TemplateSyntax(TemplateError::from_minijinja(&e, &source.name, &source.content))
                })?;
            sources.insert(source.name.as_str(), source.content.as_str());
        }

        let definitions = Definitions::collect(library.iter().chain(templates));
        let prefix = definitions.import_line();
        let mapper = ErrorMapper {
            sources: &sources,
            definitions: &definitions,
            prefixed: templates.iter().map(|t| t.name.as_str()).collect(),
            prefix_len: prefix.len(),
            values: &context.values,
        };

        if !definitions.is_empty() {
            tracing::debug!(blocks = ?definitions.names(), "shared named blocks");
            env.add_template_owned(DEFINITIONS_TEMPLATE, definitions.source().to_string())
                .map_err(|e| EngineError::TemplateSyntax(mapper.map(&e)))?;

            for source in templates {
                env.add_template_owned(source.name.clone(), format!("{prefix}{}", source.content))
                    .map_err(|e| EngineError::TemplateSyntax(mapper.map(&e)))?;
            }
        }

        let mut fragments = Vec::with_capacity(templates.len());
        for source in templates {
            tracing::debug!(template = %source.name, "rendering");

            let rendered = env
                .get_template(&source.name)
                .and_then(|tmpl| tmpl.render(context! { template => context! { name => &source.name } }));

            match rendered {
                Ok(content) => fragments.push(RenderedFragment {
                    name: source.name.clone(),
                    content,
                }),
                Err(e) => {
                    if let Some(failure) = discovery.take_failure() {
                        return Err(EngineError::Connectivity(failure));
                    }
                    return Err(EngineError::TemplateExecution(mapper.map(&e)));
                }
            }
        }

        Ok(fragments)
    }

    /// Render a single template string
    pub fn render_string(&self, template: &str, context: &TemplateContext, template_name: &str) -> Result<String> {
        let fragments = self.render(&[], &[TemplateSource::new(template_name, template)], context)?;
        Ok(fragments.into_iter().map(|f| f.content).collect())
    }
}

/// Points MiniJinja errors back at the files as the user wrote them
struct ErrorMapper<'a> {
    sources: &'a HashMap<&'a str, &'a str>,
    definitions: &'a Definitions,
    /// Templates that got the import prepended
    prefixed: HashSet<&'a str>,
    prefix_len: usize,
    values: &'a serde_json::Value,
}

impl ErrorMapper<'_> {
    fn map(&self, err: &minijinja::Error) -> TemplateError {
        let name = err.name().unwrap_or_default();

        if name == DEFINITIONS_TEMPLATE
            && let Some(located) = self.definitions.locate(err.line(), err.range())
        {
            let source = self.sources.get(located.file.as_str()).copied().unwrap_or_default();
            return TemplateError::at(
                err,
                Origin {
                    name: &located.file,
                    source,
                    line: located.line,
                    range: located.range,
                },
                Some(self.values),
            );
        }

        let Some(source) = self.sources.get(name).copied() else {
            return TemplateError::at(
                err,
                Origin {
                    name,
                    source: "",
                    line: err.line(),
                    range: None,
                },
                Some(self.values),
            );
        };

        // Selected templates carry the import prefix on line 1
        let shift = if self.prefixed.contains(name) { self.prefix_len } else { 0 };
        let range = err.range().and_then(|r| {
            let shifted = r.start.checked_sub(shift)?..r.end.checked_sub(shift)?;
            source.get(shifted.clone()).map(|_| shifted)
        });

        TemplateError::at(
            err,
            Origin {
                name,
                source,
                line: err.line(),
                range,
            },
            Some(self.values),
        )
    }
}
