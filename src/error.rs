use thiserror::Error;

/// Errors raised when a parameter value fails conversion or validation.
#[derive(Error, Debug, Clone)]
pub enum ParameterError {
    #[error("Parameter '{param}': cannot convert '{value}' to {kind}")]
    Conversion {
        param: String,
        value: String,
        kind: &'static str,
    },

    #[error("Parameter '{param}': value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        param: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("Parameter '{param}': enum value '{value}' does not exist")]
    EnumValue { param: String, value: String },

    #[error("Parameter '{param}': not a file path: '{value}'")]
    NotAFilePath { param: String, value: String },

    #[error("Parameter '{param}': invalid file extension '{ext}'")]
    FileExtension { param: String, ext: String },

    #[error("Parameter '{param}' is not editable")]
    NotEditable { param: String },

    #[error("Parameter '{param}' not found on '{owner}'")]
    NotFound { param: String, owner: String },

    #[error("'{owner}' already has a parameter named '{param}'")]
    Duplicate { param: String, owner: String },

    #[error("Parameter '{param}' is not dynamic and cannot be removed")]
    NotDynamic { param: String },

    #[error("Iteration parameters are only allowed on graphs")]
    IterOnAction,

    #[error("Object parameters can only be outputs")]
    ObjectOutputOnly,
}

/// Errors raised when establishing or removing connections between parameters.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    #[error("'{src}' is not compatible with '{target}'")]
    Incompatible { src: String, target: String },

    #[error("Target parameter '{target}' is not an input")]
    NotAnInput { target: String },

    #[error("Target parameter '{target}' is already driven")]
    AlreadyConnected { target: String },

    #[error("'{src}' and '{target}' are not in the same graph")]
    CrossGraph { src: String, target: String },

    #[error("Connecting '{src}' to '{target}' would create a cycle")]
    Cycle { src: String, target: String },

    #[error("Parameter '{target}' cannot hold both a connection and a script")]
    ConflictingDriver { target: String },

    #[error("Dependency loop detected while resolving '{param}'")]
    DependencyLoop { param: String },
}

/// Errors raised while compiling or evaluating a parameter script.
#[derive(Error, Debug, Clone)]
pub enum ScriptError {
    #[error("Script '{script}': unknown alias '{alias}'")]
    UnknownAlias { script: String, alias: String },

    #[error("Script '{script}': parameter '{param}' not found on '{alias}'")]
    UnknownParam {
        script: String,
        alias: String,
        param: String,
    },

    #[error("Script '{script}': parse error: {message}")]
    Parse { script: String, message: String },

    #[error("Script '{script}': evaluation failed: {message}")]
    Eval { script: String, message: String },
}

/// Errors raised while executing actions.
#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
    #[error("Action '{action}' failed under mode '{exec_name}': {message}")]
    ActionFailed {
        action: String,
        exec_name: String,
        message: String,
    },

    #[error("Switch '{action}': selector {selector} is out of range for {input_count} inputs")]
    SelectorOutOfRange {
        action: String,
        selector: i64,
        input_count: usize,
    },

    #[error("Parameter '{param}' not found on action '{action}'")]
    ParamNotFound { action: String, param: String },

    #[error("Parameter '{param}' on action '{action}' is not an output")]
    NotAnOutput { action: String, param: String },

    #[error("Resolving input '{param}' on action '{action}' failed: {message}")]
    InputResolve {
        action: String,
        param: String,
        message: String,
    },
}

/// Errors raised by structural operations on an action graph.
#[derive(Error, Debug, Clone)]
pub enum GraphError {
    #[error("Object '{name}' not found in graph '{graph}'")]
    ObjectNotFound { name: String, graph: String },

    #[error("'{name}' is not a graph")]
    NotAGraph { name: String },

    #[error("'{name}' is not in a graph")]
    NoParent { name: String },

    #[error("Action id refers to a removed object")]
    StaleId,

    #[error("The root graph cannot be removed")]
    RemoveRoot,
}

/// Errors raised while reading or writing persisted graph documents.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Not an action graph file: {path}")]
    Extension { path: String },

    #[error("Failed accessing '{path}': {message}")]
    Io { path: String, message: String },

    #[error("Malformed graph document: {message}")]
    Format { message: String },

    #[error("Binary snapshot error: {message}")]
    Binary { message: String },
}

/// Errors raised by registry lookups.
#[derive(Error, Debug, Clone)]
pub enum RegistryError {
    #[error("Action type not found: '{name}'")]
    ActionNotFound { name: String },

    #[error("Graph source not found: '{name}'")]
    GraphNotFound { name: String },

    #[error("Ambiguous type name '{name}': registered in namespaces {namespaces}")]
    Ambiguous { name: String, namespaces: String },
}

/// Umbrella error for all engine operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
