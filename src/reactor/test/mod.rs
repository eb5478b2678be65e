mod state_loop;
mod state_reply;
