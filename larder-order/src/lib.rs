pub mod models;
pub mod error;
pub mod planner;
pub mod reservation;
pub mod cache;
pub mod ledger;
pub mod state_machine;
pub mod service;

pub use error::OrderError;
pub use models::{
    BackorderItem, BackorderLine, FulfillmentLine, FulfillmentPlan, Order, OrderFilter, OrderItem,
    OrderRequest, OrderStatus, PaymentStatus, RequestedLine, StatusChange,
};
pub use planner::FulfillmentPlanner;
pub use reservation::{Reservation, ReservationExecutor};
pub use cache::{CacheScope, InMemoryOrderListCache, OrderListCache};
pub use ledger::{InMemoryOrderRepository, OrderLedger, OrderRepository};
pub use state_machine::{OrderStateMachine, RestockedLine, Transition};
pub use service::{OrderConfig, OrderService, OrderStores};
