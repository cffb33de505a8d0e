//! # beanforge
//!
//! A definition-driven bean container for Rust, inspired by the Spring
//! Framework's bean factory.
//!
//! ## Features
//!
//! - **Definition-driven creation**: beans are described by
//!   [`BeanDefinition`]s with constructors, factory methods, suppliers,
//!   and configured argument values
//! - **Singleton sharing**: instances created once, cached, and handed out
//!   as `Arc` handles, with circular references resolved through early
//!   exposure
//! - **Trait exposure**: concrete beans answer lookups for the traits they
//!   declare through type bindings
//! - **Autowiring**: by-type dependency resolution with primary, priority,
//!   and qualifier tie-breaking, plus `Vec`/`Map` collection injection
//! - **Factory hierarchies**: child factories shadow and fall back to a
//!   parent
//! - **Lifecycle**: initialization callbacks, destroy methods, and
//!   dependents-first destruction ordering
//!
//! ## Quick Start
//!
//! ```rust
//! use beanforge::{BeanDefinition, BeanFactory, ParamSpec};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! let factory = BeanFactory::new();
//! factory.register_bean_definition(
//!     "database",
//!     BeanDefinition::of::<Database>()
//!         .constructor0(|| Database {
//!             url: "postgres://localhost".to_string(),
//!         })
//!         .build(),
//! )?;
//! factory.register_bean_definition(
//!     "user_service",
//!     BeanDefinition::of::<UserService>()
//!         .constructor(vec![ParamSpec::of::<Database>()], |args| {
//!             Ok(UserService {
//!                 db: args.arg::<Database>(0)?,
//!             })
//!         })
//!         .build(),
//! )?;
//!
//! let service = factory.get_bean_as::<UserService>("user_service")?;
//! assert_eq!(service.db.url, "postgres://localhost");
//! factory.destroy_singletons();
//! # Ok::<(), beanforge::BeansError>(())
//! ```
//!
//! The dependency on `Database` was autowired: the constructor parameter
//! declares the type, and the container finds the unique bean answering it.
//!
//! ## Trait Resolution
//!
//! ```rust
//! use beanforge::{BeanDefinition, BeanFactory};
//!
//! trait Logger: Send + Sync {
//!     fn log(&self, message: &str);
//! }
//!
//! struct ConsoleLogger;
//! impl Logger for ConsoleLogger {
//!     fn log(&self, message: &str) {
//!         println!("[log] {}", message);
//!     }
//! }
//!
//! let factory = BeanFactory::new();
//! factory.register_bean_definition(
//!     "console_logger",
//!     BeanDefinition::of::<ConsoleLogger>()
//!         .constructor0(|| ConsoleLogger)
//!         .implements::<dyn Logger>(|a| a)
//!         .build(),
//! )?;
//!
//! let logger = factory.get_bean_of_trait::<dyn Logger>()?;
//! logger.log("container ready");
//! factory.destroy_singletons();
//! # Ok::<(), beanforge::BeansError>(())
//! ```
//!
//! ## Scopes
//!
//! Beans are singletons unless the definition says otherwise. Prototypes
//! are created fresh per request; custom scopes delegate storage to a
//! registered [`Scope`] implementation.
//!
//! ```rust
//! use beanforge::{BeanDefinition, BeanFactory};
//! use std::sync::Arc;
//!
//! struct RequestId(u64);
//!
//! let factory = BeanFactory::new();
//! factory.register_bean_definition(
//!     "request_id",
//!     BeanDefinition::of::<RequestId>()
//!         .constructor0(|| RequestId(7))
//!         .prototype()
//!         .build(),
//! )?;
//!
//! let first = factory.get_bean_as::<RequestId>("request_id")?;
//! let second = factory.get_bean_as::<RequestId>("request_id")?;
//! assert!(!Arc::ptr_eq(&first, &second));
//! # Ok::<(), beanforge::BeansError>(())
//! ```

pub mod convert;
pub mod definition;
pub mod descriptor;
pub mod error;
pub mod factory;
pub mod key;
pub mod lifecycle;
pub mod processor;

mod disposal;
mod singleton;

pub use convert::{SimpleTypeConverter, TypeConverter};
pub use definition::merged::MergedBeanDefinition;
pub use definition::values::{
    ConstructorArgumentValues, PropertyValue, PropertyValues, Value, ValueHolder,
};
pub use definition::{
    AutowireMode, BeanDefinition, BeanDefinitionBuilder, BeanRole, BeanScope, ConstructorSpec,
    DependencyCheck, FactoryMethodSpec, MethodSpec, ParamShape, ParamSpec, PropertySpec,
    ResolvedArgs, TypeBinding, INFER_METHOD,
};
pub use descriptor::{
    BeanProvider, DependencyComparator, DependencyDescriptor, DependencyTarget, OrderedCandidate,
};
pub use error::{BeansError, BeansResult};
pub use factory::{BeanFactory, BeanFactoryBuilder, Scope, TypeLoader, FACTORY_BEAN_PREFIX};
pub use key::{bean_as, bean_as_trait, key_of, trait_bean, BeanArc, TypeKey};
pub use lifecycle::{
    BeanFactoryAware, BeanNameAware, Disposable, FactoryBean, Initializing,
    SingletonsInstantiated, AFTER_PROPERTIES_SET, DESTROY,
};
pub use processor::{
    AfterInitialization, AfterInstantiation, BeforeInitialization, BeforeInstantiation,
    ConstructorSelector, DestructionProcessor, EarlyReferenceProcessor,
    MergedDefinitionProcessor, PropertyProcessor,
};
